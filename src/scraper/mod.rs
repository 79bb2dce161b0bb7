//! Order page scraping through a WebDriver-controlled browser.
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use reqwest::Url;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Portal;
use crate::model::{OrderDetails, OrderId};

pub mod parse;
pub mod session;

use session::StorageState;

/// Budget for navigation and session restore on top of the table wait.
const NAVIGATION_SLACK: Duration = Duration::from_secs(30);

const ITEM_TABLE: &str = "tbody tr";

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("session unusable: {0}")]
    Session(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("page structure mismatch: {0}")]
    Structure(&'static str),
}

impl From<CmdError> for ScrapeError {
    fn from(err: CmdError) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}

#[async_trait]
pub trait OrderScraper: Send + Sync {
    async fn scrape(&self, order_id: &OrderId) -> Result<OrderDetails, ScrapeError>;
}

/// Open a fresh WebDriver session with Chrome options suited to the portal.
pub async fn connect_browser(webdriver_url: &str, headless: bool) -> Result<Client, ScrapeError> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled",
        "--window-size=1366,900",
    ];
    if headless {
        args.push("--headless=new");
    }
    let mut caps = Map::new();
    caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
    ClientBuilder::native()
        .capabilities(caps)
        .connect(webdriver_url)
        .await
        .map_err(|err| ScrapeError::Browser(format!("webdriver connect failed: {}", err)))
}

/// Scraper for the seller portal's order detail page.
#[derive(Debug, Clone)]
pub struct PortalScraper {
    portal: Portal,
}

impl PortalScraper {
    pub fn new(portal: Portal) -> Self {
        Self { portal }
    }

    fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.portal.wait_timeout_secs)
    }

    async fn restore_session(&self, client: &Client, state: &StorageState) -> Result<(), ScrapeError> {
        let base = Url::parse(&self.portal.base_url)
            .map_err(|err| ScrapeError::Session(format!("invalid portal url: {}", err)))?;
        let host = base.host_str().unwrap_or_default().to_string();
        let origin = base.origin().ascii_serialization();

        // Cookies can only be set for the domain currently loaded.
        client.goto(base.as_str()).await?;

        let mut restored = 0usize;
        for cookie in state.live_cookies_for(&host) {
            match client.add_cookie(cookie.to_webdriver()).await {
                Ok(()) => restored += 1,
                Err(err) => debug!(name = %cookie.name, ?err, "cookie rejected"),
            }
        }
        if restored == 0 {
            return Err(ScrapeError::Session(format!("no live cookies for {}", host)));
        }

        let entries: Vec<Value> = state
            .local_storage_for(&origin)
            .iter()
            .map(|e| json!([e.name, e.value]))
            .collect();
        if !entries.is_empty() {
            client
                .execute(
                    "for (const [k, v] of arguments[0]) { window.localStorage.setItem(k, v); }",
                    vec![Value::Array(entries)],
                )
                .await?;
        }
        debug!(restored, "session restored");
        Ok(())
    }

    async fn scrape_with(
        &self,
        client: &Client,
        order_id: &OrderId,
        state: &StorageState,
    ) -> Result<OrderDetails, ScrapeError> {
        self.restore_session(client, state).await?;

        let url = self.portal.order_url(order_id.as_str());
        client.goto(&url).await?;

        let waited = client
            .wait()
            .at_most(self.wait_timeout())
            .for_element(Locator::Css(ITEM_TABLE))
            .await;
        if let Err(err) = waited {
            let current = client.current_url().await?;
            if parse::looks_like_login(current.as_str()) {
                return Err(ScrapeError::Session("session expired; recapture it".into()));
            }
            return Err(match err {
                CmdError::WaitTimeout => ScrapeError::Timeout(self.wait_timeout()),
                other => other.into(),
            });
        }

        let html = client.source().await?;
        parse::parse_order_page(&html)
    }
}

#[async_trait]
impl OrderScraper for PortalScraper {
    #[instrument(skip_all, fields(order_id = %order_id))]
    async fn scrape(&self, order_id: &OrderId) -> Result<OrderDetails, ScrapeError> {
        let state = StorageState::load(&self.portal.session_path)?;
        let client = connect_browser(&self.portal.webdriver_url, self.portal.headless).await?;

        let budget = self.wait_timeout() + NAVIGATION_SLACK;
        let result = match tokio::time::timeout(budget, self.scrape_with(&client, order_id, &state)).await {
            Ok(res) => res,
            Err(_) => Err(ScrapeError::Timeout(budget)),
        };

        // The browser session is released on every path.
        if let Err(err) = client.close().await {
            warn!(?err, "failed to close browser session");
        }

        match &result {
            Ok(details) => info!(buyer = %details.buyer, items = details.items.len(), "scraped order"),
            Err(err) => warn!(%err, "scrape failed"),
        }
        result
    }
}
