//! `GmailClient` against a local mock of the Gmail REST surface.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tcg_orderbot::gmail::body::message_text;
use tcg_orderbot::gmail::model::AuthorizedUser;
use tcg_orderbot::gmail::{GmailClient, InboxService};
use tcg_orderbot::model::OrderId;

const MESSAGES: &str = "/gmail/v1/users/me/messages";

fn creds(server: &MockServer, token: Option<&str>) -> AuthorizedUser {
    serde_json::from_value(json!({
        "token": token,
        "refresh_token": "refresh",
        "client_id": "client",
        "client_secret": "secret",
        "token_uri": format!("{}/token", server.uri()),
    }))
    .unwrap()
}

fn client(server: &MockServer, token: Option<&str>) -> GmailClient {
    let base = format!("{}/gmail/v1/users/me/", server.uri()).parse().unwrap();
    GmailClient::with_base_url(creds(server, token), base).unwrap()
}

#[tokio::test]
async fn search_follows_page_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MESSAGES))
        .and(query_param("pageToken", "p2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"messages": [{"id": "m3"}]})),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MESSAGES))
        .and(query_param("q", "is:unread"))
        .and(header("authorization", "Bearer cached"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2"}],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    let ids = client(&server, Some("cached"))
        .search("is:unread")
        .await
        .unwrap();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn empty_inbox_has_no_messages_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MESSAGES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultSizeEstimate": 0})))
        .mount(&server)
        .await;

    let ids = client(&server, Some("cached")).search("x").await.unwrap();
    assert!(ids.is_empty());
}

#[tokio::test]
async fn missing_token_is_refreshed_once_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MESSAGES))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let gmail = client(&server, None);
    gmail.search("a").await.unwrap();
    gmail.search("b").await.unwrap();
}

#[tokio::test]
async fn failed_refresh_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let err = client(&server, None).search("a").await.unwrap_err();
    assert!(err.to_string().contains("invalid_grant"), "{err}");
}

#[tokio::test]
async fn get_message_decodes_multipart_body() {
    let server = MockServer::start().await;
    // "<p>Order: ab12cd34-56ef78-90ab1</p>" in base64url
    let data = "PHA-T3JkZXI6IGFiMTJjZDM0LTU2ZWY3OC05MGFiMTwvcD4";
    Mock::given(method("GET"))
        .and(path(format!("{MESSAGES}/m1")))
        .and(query_param("format", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m1",
            "snippet": "You have a new order",
            "payload": {
                "mimeType": "multipart/alternative",
                "body": {"size": 0},
                "parts": [
                    {"mimeType": "text/html", "body": {"size": 36, "data": data}}
                ]
            }
        })))
        .mount(&server)
        .await;

    let msg = client(&server, Some("cached")).get_message("m1").await.unwrap();
    let text = message_text(&msg);
    assert!(text.contains("Order: ab12cd34-56ef78-90ab1"), "{text}");
    assert_eq!(
        OrderId::extract(&text).map(|id| id.to_string()).as_deref(),
        Some("AB12CD34-56EF78-90AB1")
    );
}

#[tokio::test]
async fn mark_read_removes_unread_label() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{MESSAGES}/batchModify")))
        .and(body_json(json!({"ids": ["m1", "m2"], "removeLabelIds": ["UNREAD"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, Some("cached"))
        .mark_read(&["m1".to_string(), "m2".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn rate_limit_surfaces_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{MESSAGES}/batchModify")))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = client(&server, Some("cached"))
        .mark_read(&["m1".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("429"), "{err}");
}
