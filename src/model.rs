use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

static ORDER_ID_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-F0-9]{8}-[A-F0-9]{6}-[A-F0-9]{5}$").expect("valid regex"));

static ORDER_ID_ANCHORED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\border\s*(?:id|number|no\.?|#)?\s*[:#]?\s*([a-f0-9]{8}-[a-f0-9]{6}-[a-f0-9]{5})\b",
    )
    .expect("valid regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
#[error("not an order id: {0:?}")]
pub struct OrderIdError(pub String);

/// Seller portal order code, 8-6-5 uppercase hex groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderId(String);

impl OrderId {
    /// Find the first id following an "Order" anchor in free-form text.
    pub fn extract(text: &str) -> Option<OrderId> {
        ORDER_ID_ANCHORED
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| OrderId(m.as_str().to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = OrderIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        if ORDER_ID_EXACT.is_match(&normalized) {
            Ok(OrderId(normalized))
        } else {
            Err(OrderIdError(s.to_string()))
        }
    }
}

impl TryFrom<String> for OrderId {
    type Error = OrderIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderId> for String {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line item as displayed on the portal. Quantity and price stay strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: String,
    pub price: String,
}

impl OrderItem {
    pub fn new(name: impl Into<String>, quantity: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: quantity.into(),
            price: price.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub buyer: String,
    pub items: Vec<OrderItem>,
}

/// Keep the first item seen for each name, preserving order.
pub fn dedup_items(items: Vec<OrderItem>) -> Vec<OrderItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.name.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Packed,
    Delivered,
    Issue,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [OrderStatus::Packed, OrderStatus::Delivered, OrderStatus::Issue];

    pub fn emoji(&self) -> &'static str {
        match self {
            OrderStatus::Packed => "📦",
            OrderStatus::Delivered => "✅",
            OrderStatus::Issue => "⚠️",
        }
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            OrderStatus::Packed => "is now **Packed**",
            OrderStatus::Delivered => "has been **Delivered**",
            OrderStatus::Issue => "has an **Issue**",
        }
    }

    /// Gateway events may drop the U+FE0F variation selector.
    pub fn from_emoji(emoji: &str) -> Option<OrderStatus> {
        let bare = emoji.trim_end_matches('\u{fe0f}');
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.emoji().trim_end_matches('\u{fe0f}') == bare)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_anchored_id() {
        let id = OrderId::extract("Order: AB12CD34-56EF78-90AB1 has shipped").unwrap();
        assert_eq!(id.as_str(), "AB12CD34-56EF78-90AB1");
    }

    #[test]
    fn extraction_uppercases() {
        let id = OrderId::extract("your order: ab12cd34-56ef78-90ab1.").unwrap();
        assert_eq!(id.as_str(), "AB12CD34-56EF78-90AB1");
    }

    #[test]
    fn extraction_accepts_common_anchor_forms() {
        for text in [
            "Order #11111111-222222-33333",
            "Order Number: 11111111-222222-33333",
            "New Order:11111111-222222-33333",
        ] {
            assert_eq!(
                OrderId::extract(text).map(|id| id.to_string()),
                Some("11111111-222222-33333".to_string()),
                "{text}"
            );
        }
    }

    #[test]
    fn extraction_requires_anchor_and_shape() {
        assert!(OrderId::extract("AB12CD34-56EF78-90AB1 without anchor").is_none());
        assert!(OrderId::extract("Order: AB12CD34-56EF78-90AB").is_none());
        assert!(OrderId::extract("Order: AB12CD34-56EF78-90AB12").is_none());
        assert!(OrderId::extract("Order: GB12CD34-56EF78-90AB1").is_none());
        assert!(OrderId::extract("").is_none());
    }

    #[test]
    fn parse_validates() {
        assert!("ab12cd34-56ef78-90ab1".parse::<OrderId>().is_ok());
        assert_eq!(
            "nope".parse::<OrderId>(),
            Err(OrderIdError("nope".to_string()))
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let items = vec![
            OrderItem::new("A", "1", "$1"),
            OrderItem::new("B", "2", "$2"),
            OrderItem::new("A", "9", "$9"),
            OrderItem::new("C", "3", "$3"),
            OrderItem::new("B", "8", "$8"),
        ];
        let out = dedup_items(items);
        assert_eq!(
            out,
            vec![
                OrderItem::new("A", "1", "$1"),
                OrderItem::new("B", "2", "$2"),
                OrderItem::new("C", "3", "$3"),
            ]
        );
    }

    #[test]
    fn status_from_emoji() {
        assert_eq!(OrderStatus::from_emoji("📦"), Some(OrderStatus::Packed));
        assert_eq!(OrderStatus::from_emoji("✅"), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::from_emoji("⚠️"), Some(OrderStatus::Issue));
        assert_eq!(OrderStatus::from_emoji("⚠"), Some(OrderStatus::Issue));
        assert_eq!(OrderStatus::from_emoji("👍"), None);
    }
}
