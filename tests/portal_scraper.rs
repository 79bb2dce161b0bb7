//! `PortalScraper` against a local mock WebDriver endpoint. Every path must
//! end the browser session exactly once.

use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tcg_orderbot::config::Portal;
use tcg_orderbot::model::OrderId;
use tcg_orderbot::scraper::session::{StorageState, StoredCookie};
use tcg_orderbot::scraper::{OrderScraper, PortalScraper, ScrapeError};

const SESSION: &str = "/session/s1";
const BASE: &str = "https://sellerportal.example";
const ORDER: &str = "AB12CD34-56EF78-90AB1";

const ORDER_PAGE: &str = r#"<html><body>
  <div class="buyer"><span>Buyer</span><strong>Jane Doe</strong></div>
  <table><tbody>
    <tr><td><a href="/product/1">Booster Box</a></td><td>Sealed</td><td>2</td><td>$89.99</td></tr>
  </tbody></table>
</body></html>"#;

fn value(v: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "value": v }))
}

fn no_such_element() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "value": {"error": "no such element", "message": "no match for tbody tr", "stacktrace": ""}
    }))
}

fn write_session(dir: &Path) -> std::path::PathBuf {
    let state = StorageState {
        cookies: vec![StoredCookie {
            name: "auth".into(),
            value: "a".into(),
            domain: "sellerportal.example".into(),
            path: "/".into(),
            expires: -1.0,
            http_only: true,
            secure: true,
            same_site: None,
        }],
        origins: vec![],
    };
    let p = dir.join("state.json");
    state.save(&p).unwrap();
    p
}

/// Mock WebDriver whose current URL is `current_url`; the item table lookup
/// answers with `element`.
async fn webdriver(current_url: &str, element: ResponseTemplate, source: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(value(json!({"sessionId": "s1", "capabilities": {}})))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SESSION}/url")))
        .respond_with(value(json!(current_url)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{SESSION}/element")))
        .respond_with(element)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SESSION}/source")))
        .respond_with(value(json!(source)))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(SESSION))
        .respond_with(value(Value::Null))
        .expect(1)
        .mount(&server)
        .await;
    // Navigation and cookie writes.
    Mock::given(method("POST"))
        .respond_with(value(Value::Null))
        .with_priority(10)
        .mount(&server)
        .await;
    server
}

fn portal_scraper(server: &MockServer, td: &TempDir) -> PortalScraper {
    PortalScraper::new(Portal {
        base_url: BASE.into(),
        session_path: write_session(td.path()),
        webdriver_url: server.uri(),
        headless: true,
        wait_timeout_secs: 1,
    })
}

fn order() -> OrderId {
    ORDER.parse().unwrap()
}

fn found() -> ResponseTemplate {
    value(json!({"element-6066-11e4-a52e-4f735466cecf": "e1"}))
}

#[tokio::test]
async fn scrape_reads_order_and_closes_browser() {
    let server = webdriver(&format!("{BASE}/orders/{ORDER}"), found(), ORDER_PAGE).await;
    let td = tempfile::tempdir().unwrap();

    let details = portal_scraper(&server, &td).scrape(&order()).await.unwrap();
    assert_eq!(details.buyer, "Jane Doe");
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].quantity, "2");
}

#[tokio::test]
async fn missing_buyer_closes_browser() {
    let page = "<html><body><table><tbody><tr><td>x</td></tr></tbody></table></body></html>";
    let server = webdriver(&format!("{BASE}/orders/{ORDER}"), found(), page).await;
    let td = tempfile::tempdir().unwrap();

    let err = portal_scraper(&server, &td).scrape(&order()).await.unwrap_err();
    assert!(matches!(err, ScrapeError::Structure(_)), "{err}");
}

#[tokio::test]
async fn table_wait_timeout_closes_browser() {
    let server = webdriver(&format!("{BASE}/orders/{ORDER}"), no_such_element(), "").await;
    let td = tempfile::tempdir().unwrap();

    let err = portal_scraper(&server, &td).scrape(&order()).await.unwrap_err();
    assert!(matches!(err, ScrapeError::Timeout(_)), "{err}");
}

#[tokio::test]
async fn login_redirect_is_session_error_and_closes_browser() {
    let server = webdriver(&format!("{BASE}/login?returnUrl=%2Forders"), no_such_element(), "").await;
    let td = tempfile::tempdir().unwrap();

    let err = portal_scraper(&server, &td).scrape(&order()).await.unwrap_err();
    assert!(matches!(err, ScrapeError::Session(_)), "{err}");
}
