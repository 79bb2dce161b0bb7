use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::discord::{ChatService, DiscordClient};
use crate::gmail::{self, GmailClient, InboxService};
use crate::scraper::session::StorageState;
use crate::scraper::{OrderScraper, PortalScraper};

/// Process-wide state shared by the poller and the reaction watcher.
///
/// Built once at startup; everything in it is read-only afterwards.
pub struct AppContext {
    pub config: Config,
    pub inbox: Arc<dyn InboxService>,
    pub scraper: Arc<dyn OrderScraper>,
    pub chat: Arc<dyn ChatService>,
    /// The bot's own user id, used to ignore its own reactions.
    pub bot_user_id: String,
}

impl AppContext {
    pub fn new(
        config: Config,
        inbox: Arc<dyn InboxService>,
        scraper: Arc<dyn OrderScraper>,
        chat: Arc<dyn ChatService>,
        bot_user_id: impl Into<String>,
    ) -> Self {
        Self {
            config,
            inbox,
            scraper,
            chat,
            bot_user_id: bot_user_id.into(),
        }
    }

    /// Load credential and session artifacts and resolve the chat identity.
    /// Any failure here is fatal.
    pub async fn init(config: Config) -> Result<Self> {
        let creds = gmail::load_credentials(&config.gmail.credentials_path)?;
        StorageState::load(&config.portal.session_path)
            .context("session artifact missing; run capture_session first")?;

        let inbox = GmailClient::new(creds)?;
        let scraper = PortalScraper::new(config.portal.clone());
        let chat = DiscordClient::new(&config.discord.bot_token);
        let me = chat
            .current_user()
            .await
            .context("failed to resolve bot identity")?;
        info!(bot = %me.username, id = %me.id, "chat identity resolved");

        Ok(Self::new(
            config,
            Arc::new(inbox),
            Arc::new(scraper),
            Arc::new(chat),
            me.id,
        ))
    }
}
