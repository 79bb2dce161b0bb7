//! Captured browser session in Playwright's `storage_state` layout, so files
//! produced by either tool are interchangeable.
use chrono::Utc;
use fantoccini::cookies::Cookie;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::ScrapeError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    /// Unix seconds; `-1` marks a session cookie.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OriginState {
    pub origin: String,
    #[serde(default, rename = "localStorage")]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

fn root_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

impl StoredCookie {
    pub fn is_expired(&self, now_unix: f64) -> bool {
        self.expires > 0.0 && self.expires < now_unix
    }

    /// Domain-match per RFC 6265: exact host, or a dot-less suffix on a label boundary.
    pub fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        host == domain || host.ends_with(&format!(".{}", domain))
    }

    pub fn to_webdriver(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), self.value.clone());
        cookie.set_domain(self.domain.clone());
        cookie.set_path(self.path.clone());
        cookie.set_secure(self.secure);
        cookie.set_http_only(self.http_only);
        cookie
    }

    pub fn from_webdriver(cookie: &Cookie<'_>) -> Self {
        Self {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain: cookie.domain().unwrap_or_default().to_string(),
            path: cookie.path().unwrap_or("/").to_string(),
            expires: cookie
                .expires_datetime()
                .map(|at| at.unix_timestamp() as f64)
                .unwrap_or_else(session_expiry),
            http_only: cookie.http_only().unwrap_or(false),
            secure: cookie.secure().unwrap_or(false),
            same_site: cookie.same_site().map(|s| s.to_string()),
        }
    }
}

impl StorageState {
    pub fn load(path: &Path) -> Result<Self, ScrapeError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ScrapeError::Session(format!("cannot read {}: {}", path.display(), err))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            ScrapeError::Session(format!("invalid session file {}: {}", path.display(), err))
        })
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)
    }

    /// Unexpired cookies that the browser will accept on `host`.
    pub fn live_cookies_for<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a StoredCookie> {
        let now = Utc::now().timestamp() as f64;
        self.cookies
            .iter()
            .filter(move |c| c.matches_host(host) && !c.is_expired(now))
    }

    pub fn local_storage_for(&self, origin: &str) -> &[StorageEntry] {
        let origin = origin.trim_end_matches('/');
        self.origins
            .iter()
            .find(|o| o.origin.trim_end_matches('/') == origin)
            .map(|o| o.local_storage.as_slice())
            .unwrap_or(&[])
    }
}
