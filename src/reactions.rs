use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument};

use crate::context::AppContext;
use crate::discord::{AllowedMentions, ChatMessage, OutgoingMessage, ReactionEvent};
use crate::dispatch::{FIELD_BUYER, FIELD_ORDER_ID};
use crate::model::{OrderId, OrderStatus};

pub fn status_announcement(order_id: &OrderId, status: OrderStatus, user_id: &str) -> String {
    format!("🆔 Order `{}` {} by <@{}>", order_id, status.phrase(), user_id)
}

/// Announce a recognized status reaction. Returns the posted announcement, or
/// `None` when the event is ignored.
#[instrument(skip_all, fields(message_id = %event.message_id, emoji = %event.emoji))]
pub async fn handle_reaction(ctx: &AppContext, event: &ReactionEvent) -> Result<Option<ChatMessage>> {
    if event.user_id == ctx.bot_user_id {
        return Ok(None);
    }
    if event.channel_id != ctx.config.discord.channel_id {
        return Ok(None);
    }
    let Some(status) = OrderStatus::from_emoji(&event.emoji) else {
        return Ok(None);
    };

    let original = ctx
        .chat
        .get_message(&event.channel_id, &event.message_id)
        .await
        .context("failed to fetch reacted message")?;
    let Some(order_id) = original
        .embed_field(FIELD_ORDER_ID)
        .and_then(|v| v.parse::<OrderId>().ok())
    else {
        debug!("reacted message is not an order notification");
        return Ok(None);
    };
    let buyer = original.embed_field(FIELD_BUYER).unwrap_or_default();

    // Every recognized reaction is announced; no transition checks.
    let message = OutgoingMessage {
        content: Some(status_announcement(&order_id, status, &event.user_id)),
        embeds: vec![],
        allowed_mentions: Some(AllowedMentions::default()),
    };
    let posted = ctx
        .chat
        .send_message(&event.channel_id, &message)
        .await
        .context("failed to post status update")?;
    info!(%order_id, buyer, ?status, user_id = %event.user_id, "status update posted");
    Ok(Some(posted))
}

/// Handle events one at a time until shutdown or until the gateway hangs up.
pub async fn run(
    ctx: &AppContext,
    mut events: mpsc::Receiver<ReactionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("reaction watcher started");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if let Err(err) = handle_reaction(ctx, &event).await {
                        error!(?err, "failed to handle reaction");
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    info!("reaction watcher stopped");
}
