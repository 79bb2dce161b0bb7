use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::fmt;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

use crate::gmail::model::{AuthorizedUser, ListMessagesResponse, TokenResponse};

pub mod body;
pub mod model;

pub use model::{InboxMessage, MessagePart, MessageRef, PartBody};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me/";

/// Refresh this long before the provider-reported expiry.
const EXPIRY_SLACK_SECS: i64 = 60;

/// Inbox capabilities the poller needs: search, get, mark read.
#[async_trait]
pub trait InboxService: Send + Sync {
    /// Ids of all messages matching `query`, across pages.
    async fn search(&self, query: &str) -> Result<Vec<String>>;

    async fn get_message(&self, id: &str) -> Result<InboxMessage>;

    /// Clear the UNREAD label on the given messages.
    async fn mark_read(&self, ids: &[String]) -> Result<()>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - Duration::seconds(EXPIRY_SLACK_SECS) > now,
            None => true,
        }
    }
}

pub struct GmailClient {
    http: Client,
    base_url: Url,
    creds: AuthorizedUser,
    token: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for GmailClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmailClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Read the authorized-user credential file. Missing or malformed is fatal at startup.
pub fn load_credentials(path: &Path) -> Result<AuthorizedUser> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read inbox credentials {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid inbox credentials {}", path.display()))
}

impl GmailClient {
    pub fn new(creds: AuthorizedUser) -> Result<Self> {
        let base_url = Url::parse(GMAIL_API_BASE).context("invalid default Gmail URL")?;
        Self::with_base_url(creds, base_url)
    }

    pub fn with_base_url(creds: AuthorizedUser, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tcg-orderbot/0.1")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build reqwest client")?;
        let token = creds.token.clone().map(|value| CachedToken {
            value,
            expires_at: creds.expiry,
        });
        Ok(Self {
            http,
            base_url,
            creds,
            token: Mutex::new(token),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(cached.value.clone());
        }
        let fresh = self.refresh().await?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    async fn refresh(&self) -> Result<CachedToken> {
        debug!(token_uri = %self.creds.token_uri, "refreshing inbox access token");
        let res = self
            .http
            .post(&self.creds.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.creds.refresh_token.as_str()),
                ("client_id", self.creds.client_id.as_str()),
                ("client_secret", self.creds.client_secret.as_str()),
            ])
            .send()
            .await
            .context("failed to reach token endpoint")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("token refresh failed {}: {}", status, body));
        }
        let payload: TokenResponse = res.json().await.context("invalid token response")?;
        Ok(CachedToken {
            value: payload.access_token,
            expires_at: payload
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("invalid Gmail base URL")
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response> {
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from Gmail: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("gmail error {}: {}", status, body));
        }
        Ok(res)
    }
}

#[async_trait]
impl InboxService for GmailClient {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let endpoint = self.endpoint("messages")?;
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let token = self.access_token().await?;
            let mut req = self
                .http
                .get(endpoint.clone())
                .bearer_auth(token)
                .query(&[("q", query)]);
            if let Some(page) = page_token.as_deref() {
                req = req.query(&[("pageToken", page)]);
            }
            let res = req.send().await.context("failed to reach Gmail")?;
            let page: ListMessagesResponse = Self::check(res)
                .await?
                .json()
                .await
                .context("invalid Gmail list response")?;
            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        debug!(query, count = ids.len(), "inbox search");
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<InboxMessage> {
        let endpoint = self.endpoint(&format!("messages/{}", id))?;
        let token = self.access_token().await?;
        let res = self
            .http
            .get(endpoint)
            .bearer_auth(token)
            .query(&[("format", "full")])
            .send()
            .await
            .context("failed to reach Gmail")?;
        Self::check(res)
            .await?
            .json()
            .await
            .context("invalid Gmail message response")
    }

    async fn mark_read(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let endpoint = self.endpoint("messages/batchModify")?;
        let token = self.access_token().await?;
        let res = self
            .http
            .post(endpoint)
            .bearer_auth(token)
            .json(&json!({ "ids": ids, "removeLabelIds": ["UNREAD"] }))
            .send()
            .await
            .context("failed to reach Gmail")?;
        Self::check(res).await?;
        Ok(())
    }
}
