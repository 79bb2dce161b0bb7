use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serenity::all::{
    ChannelId, CreateAllowedMentions, CreateEmbed, CreateMessage, Message, MessageId,
    ReactionType, RoleId,
};
use serenity::http::{Http, HttpBuilder};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub mod gateway;
pub mod model;

pub use model::{
    AllowedMentions, ChatMessage, Embed, EmbedField, OutgoingMessage, ReactionEvent, User,
};

/// Chat capabilities used by the dispatcher and the reaction watcher.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn send_message(&self, channel_id: &str, message: &OutgoingMessage)
        -> Result<ChatMessage>;

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()>;

    async fn get_message(&self, channel_id: &str, message_id: &str) -> Result<ChatMessage>;

    async fn current_user(&self) -> Result<User>;
}

/// Discord REST through serenity's `Http`, which owns rate limiting.
#[derive(Clone)]
pub struct DiscordClient {
    http: Arc<Http>,
}

impl fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient").finish_non_exhaustive()
    }
}

/// Parse a Discord snowflake; zero is not a valid id.
pub fn snowflake(kind: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| anyhow!("invalid {} id {:?}", kind, raw))
}

fn channel(raw: &str) -> Result<ChannelId> {
    Ok(ChannelId::new(snowflake("channel", raw)?))
}

fn message_id(raw: &str) -> Result<MessageId> {
    Ok(MessageId::new(snowflake("message", raw)?))
}

fn to_embed(embed: &Embed) -> CreateEmbed {
    let mut out = CreateEmbed::new();
    if let Some(title) = &embed.title {
        out = out.title(title.clone());
    }
    if let Some(color) = embed.color {
        out = out.colour(color);
    }
    out.fields(
        embed
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone(), f.inline)),
    )
}

fn to_builder(message: &OutgoingMessage) -> Result<CreateMessage> {
    let mut builder = CreateMessage::new();
    if let Some(content) = &message.content {
        builder = builder.content(content.clone());
    }
    for embed in &message.embeds {
        builder = builder.embed(to_embed(embed));
    }
    if let Some(allowed) = &message.allowed_mentions {
        let roles = allowed
            .roles
            .iter()
            .map(|r| snowflake("role", r).map(RoleId::new))
            .collect::<Result<Vec<_>>>()?;
        builder = builder.allowed_mentions(
            CreateAllowedMentions::new()
                .everyone(allowed.everyone)
                .roles(roles),
        );
    }
    Ok(builder)
}

fn from_serenity(msg: Message) -> ChatMessage {
    ChatMessage {
        id: msg.id.to_string(),
        channel_id: msg.channel_id.to_string(),
        content: msg.content,
        embeds: msg
            .embeds
            .into_iter()
            .map(|e| Embed {
                title: e.title,
                color: e.colour.map(|c| c.0),
                fields: e
                    .fields
                    .into_iter()
                    .map(|f| EmbedField {
                        name: f.name,
                        value: f.value,
                        inline: f.inline,
                    })
                    .collect(),
            })
            .collect(),
        author: Some(User {
            id: msg.author.id.to_string(),
            username: msg.author.name,
            bot: msg.author.bot,
        }),
    }
}

impl DiscordClient {
    pub fn new(token: &str) -> Self {
        Self::from_http(Http::new(token))
    }

    /// Send REST calls to `proxy` instead of discord.com.
    pub fn with_proxy(token: &str, proxy: &str) -> Self {
        Self::from_http(HttpBuilder::new(token).proxy(proxy).build())
    }

    pub fn from_http(http: Http) -> Self {
        Self {
            http: Arc::new(http),
        }
    }
}

#[async_trait]
impl ChatService for DiscordClient {
    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<ChatMessage> {
        let builder = to_builder(message)?;
        debug!(channel_id, "posting chat message");
        let posted = channel(channel_id)?
            .send_message(&self.http, builder)
            .await
            .context("failed to post chat message")?;
        Ok(from_serenity(posted))
    }

    async fn add_reaction(&self, channel_id: &str, message_id_raw: &str, emoji: &str) -> Result<()> {
        channel(channel_id)?
            .create_reaction(
                &self.http,
                message_id(message_id_raw)?,
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .with_context(|| format!("failed to add reaction {}", emoji))
    }

    async fn get_message(&self, channel_id: &str, message_id_raw: &str) -> Result<ChatMessage> {
        let msg = channel(channel_id)?
            .message(&self.http, message_id(message_id_raw)?)
            .await
            .context("failed to fetch chat message")?;
        Ok(from_serenity(msg))
    }

    async fn current_user(&self) -> Result<User> {
        let me = self
            .http
            .get_current_user()
            .await
            .context("failed to fetch bot user")?;
        Ok(User {
            id: me.id.to_string(),
            username: me.name.clone(),
            bot: me.bot,
        })
    }
}
