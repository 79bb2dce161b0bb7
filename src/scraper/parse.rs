use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::ScrapeError;
use crate::model::{dedup_items, OrderDetails, OrderItem};

static DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div").expect("valid selector"));
static STRONG: Lazy<Selector> = Lazy::new(|| Selector::parse("strong").expect("valid selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr").expect("valid selector"));
static PRODUCT_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='product']").expect("valid selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));

const BUYER_LABEL: &str = "Buyer";
const MIN_CELLS: usize = 4;

/// Extract buyer and line items from a rendered order page.
pub fn parse_order_page(html: &str) -> Result<OrderDetails, ScrapeError> {
    let doc = Html::parse_document(html);
    let buyer = find_buyer(&doc).ok_or(ScrapeError::Structure("buyer name not found"))?;
    let items = dedup_items(parse_items(&doc));
    Ok(OrderDetails { buyer, items })
}

/// Whether the browser landed on the portal's sign-in page instead of the order.
pub fn looks_like_login(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("/login") || lower.contains("/signin") || lower.contains("/sign-in")
}

fn text_of(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First bold name inside the innermost div mentioning the buyer label.
fn find_buyer(doc: &Html) -> Option<String> {
    doc.select(&DIV)
        .filter_map(|div| {
            let text = text_of(&div);
            if !text.contains(BUYER_LABEL) {
                return None;
            }
            let name = div
                .select(&STRONG)
                .map(|s| text_of(&s))
                .find(|t| !t.is_empty() && !t.contains(BUYER_LABEL))?;
            Some((text.len(), name))
        })
        .min_by_key(|(len, _)| *len)
        .map(|(_, name)| name)
}

fn parse_items(doc: &Html) -> Vec<OrderItem> {
    doc.select(&ROW)
        .filter(|row| row.select(&PRODUCT_LINK).next().is_some())
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&CELL).map(|c| text_of(&c)).collect();
            if cells.len() < MIN_CELLS || cells[0].is_empty() {
                return None;
            }
            Some(OrderItem::new(
                cells[0].clone(),
                cells[2].clone(),
                cells[3].clone(),
            ))
        })
        .collect()
}
