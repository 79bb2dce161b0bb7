//! Configuration loader and validator for the order bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::discord::snowflake;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub gmail: Gmail,
    pub portal: Portal,
    pub discord: Discord,
}

/// Poll loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_secs: u64,
    #[serde(default)]
    pub parse_miss: ParseMissPolicy,
}

/// What to do with a matching email whose body carries no order id.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseMissPolicy {
    /// Reconsider it every cycle until an operator intervenes.
    #[default]
    LeaveUnread,
    MarkRead,
}

/// Inbox API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gmail {
    pub credentials_path: PathBuf,
    pub sender: String,
    pub subject: String,
}

/// Seller portal scrape settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Portal {
    pub base_url: String,
    pub session_path: PathBuf,
    pub webdriver_url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
}

/// Chat platform settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Discord {
    pub bot_token: String,
    pub channel_id: String,
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default)]
    pub mention: Option<MentionMode>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MentionMode {
    Role,
    Everyone,
    None,
}

fn default_poll_interval() -> u64 {
    600
}

fn default_recovery_interval() -> u64 {
    60
}

fn default_wait_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Gmail {
    /// Inbox search query selecting unread order notifications.
    pub fn query(&self) -> String {
        format!("from:{} subject:\"{}\" is:unread", self.sender, self.subject)
    }
}

impl Portal {
    pub fn order_url(&self, order_id: &str) -> String {
        format!("{}/orders/{}", self.base_url.trim_end_matches('/'), order_id)
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.base_url.trim_end_matches('/'))
    }
}

impl Discord {
    /// Explicit mode wins; otherwise ping the role when one is set, else everyone.
    pub fn effective_mention(&self) -> MentionMode {
        match self.mention {
            Some(mode) => mode,
            None if self.role_id.is_some() => MentionMode::Role,
            None => MentionMode::Everyone,
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    apply_env(&mut cfg, |key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

#[derive(Deserialize)]
struct PortalSection {
    portal: Portal,
}

/// Load and validate only the `portal` section, for tools that only drive the browser.
pub fn load_portal(path: Option<&Path>) -> Result<Portal, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let section: PortalSection = serde_yaml::from_str(&content)?;
    validate_portal(&section.portal)?;
    Ok(section.portal)
}

/// Secrets and channel ids may come from the environment (or `.env`).
fn apply_env(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(token) = non_empty("DISCORD_BOT_TOKEN") {
        cfg.discord.bot_token = token;
    }
    if let Some(channel) = non_empty("DISCORD_CHANNEL_ID") {
        cfg.discord.channel_id = channel;
    }
    if let Some(role) = non_empty("DISCORD_ROLE_ID") {
        cfg.discord.role_id = Some(role);
    }
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }
    if cfg.app.recovery_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.recovery_interval_secs must be > 0"));
    }

    if cfg.gmail.credentials_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("gmail.credentials_path must be non-empty"));
    }
    if cfg.gmail.sender.trim().is_empty() {
        return Err(ConfigError::Invalid("gmail.sender must be non-empty"));
    }
    if cfg.gmail.subject.trim().is_empty() {
        return Err(ConfigError::Invalid("gmail.subject must be non-empty"));
    }

    validate_portal(&cfg.portal)?;

    if cfg.discord.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("discord.bot_token must be non-empty"));
    }
    if snowflake("channel", &cfg.discord.channel_id).is_err() {
        return Err(ConfigError::Invalid("discord.channel_id must be a numeric id"));
    }
    match cfg.discord.role_id.as_deref() {
        Some(role) if snowflake("role", role).is_err() => {
            return Err(ConfigError::Invalid("discord.role_id must be a numeric id"));
        }
        None if cfg.discord.effective_mention() == MentionMode::Role => {
            return Err(ConfigError::Invalid("discord.role_id is required when mention is role"));
        }
        _ => {}
    }

    Ok(())
}

fn validate_portal(portal: &Portal) -> Result<(), ConfigError> {
    if portal.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("portal.base_url must be non-empty"));
    }
    if portal.session_path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("portal.session_path must be non-empty"));
    }
    if portal.webdriver_url.trim().is_empty() {
        return Err(ConfigError::Invalid("portal.webdriver_url must be non-empty"));
    }
    if portal.wait_timeout_secs == 0 {
        return Err(ConfigError::Invalid("portal.wait_timeout_secs must be > 0"));
    }
    Ok(())
}

/// Returns the example YAML shipped with the bot.
pub fn example() -> &'static str {
    r#"app:
  poll_interval_secs: 600
  recovery_interval_secs: 60
  parse_miss: leave_unread

gmail:
  credentials_path: "token.json"
  sender: "sales@tcgplayer.com"
  subject: "Your TCGplayer.com items"

portal:
  base_url: "https://sellerportal.tcgplayer.com"
  session_path: "tcg_state.json"
  webdriver_url: "http://localhost:9515"
  headless: true
  wait_timeout_secs: 60

discord:
  bot_token: "YOUR_DISCORD_BOT_TOKEN"
  channel_id: "123456789012345678"
  role_id: "234567890123456789"
"#
}
