//! Gateway connection that forwards reaction-added events to the watcher.
//!
//! Connection lifecycle (resume, reconnect, identify pacing, fatal close
//! codes) is serenity's; this module only translates and forwards events.
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::all::{
    ChannelId, Client, Context, EventHandler, GatewayIntents, MessageId, Reaction, ReactionType,
    Ready, UserId,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::model::ReactionEvent;

/// Unicode reactions by a known user become events; custom emoji never match a status.
pub fn reaction_event(
    channel_id: ChannelId,
    message_id: MessageId,
    user_id: Option<UserId>,
    emoji: &ReactionType,
) -> Option<ReactionEvent> {
    let ReactionType::Unicode(name) = emoji else {
        return None;
    };
    Some(ReactionEvent {
        user_id: user_id?.to_string(),
        channel_id: channel_id.to_string(),
        message_id: message_id.to_string(),
        emoji: name.clone(),
    })
}

/// Hand an event to the watcher without waiting; a full queue drops the event.
pub fn forward(events: &mpsc::Sender<ReactionEvent>, event: ReactionEvent) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!(
                message_id = %event.message_id,
                emoji = %event.emoji,
                "reaction queue full; dropping event"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("reaction watcher gone; dropping event");
            false
        }
    }
}

struct ReactionForwarder {
    events: mpsc::Sender<ReactionEvent>,
}

#[async_trait]
impl EventHandler for ReactionForwarder {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(bot = %ready.user.name, "gateway session ready");
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        if let Some(event) = reaction_event(
            reaction.channel_id,
            reaction.message_id,
            reaction.user_id,
            &reaction.emoji,
        ) {
            forward(&self.events, event);
        }
    }
}

/// Run the gateway until shutdown is signalled or the connection fails for good.
pub async fn run(
    token: &str,
    events: mpsc::Sender<ReactionEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut client = Client::builder(token, GatewayIntents::GUILD_MESSAGE_REACTIONS)
        .event_handler(ReactionForwarder { events })
        .await
        .context("failed to build gateway client")?;

    let shards = client.shard_manager.clone();
    tokio::spawn(async move {
        let _ = shutdown.changed().await;
        shards.shutdown_all().await;
    });

    client.start().await.context("gateway connection failed")?;
    info!("gateway stopped");
    Ok(())
}
