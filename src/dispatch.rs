//! Order notification rendering and posting.
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::{Discord, MentionMode};
use crate::discord::{AllowedMentions, ChatMessage, ChatService, Embed, EmbedField, OutgoingMessage};
use crate::model::{OrderDetails, OrderId, OrderItem, OrderStatus};

pub const EMBED_COLOR: u32 = 0x3498db;
pub const FIELD_BUYER: &str = "Buyer";
pub const FIELD_ORDER_ID: &str = "Order ID";
pub const FIELD_ITEMS: &str = "Items";
pub const NO_ITEMS: &str = "No items found";

/// Platform limit on an embed field value, in characters.
const FIELD_VALUE_LIMIT: usize = 1024;

const REACTION_TIMEOUT: Duration = Duration::from_secs(5);

pub fn item_line(item: &OrderItem) -> String {
    format!("{}x {} — {}", item.quantity, item.name, item.price)
}

/// One line per item, cut to the field limit with a count of what was left out.
pub fn render_items(items: &[OrderItem]) -> String {
    if items.is_empty() {
        return NO_ITEMS.to_string();
    }
    let lines: Vec<String> = items.iter().map(item_line).collect();
    let full = lines.join("\n");
    if full.chars().count() <= FIELD_VALUE_LIMIT {
        return full;
    }

    let mut out = String::new();
    let mut used = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let tail = format!("…and {} more", lines.len() - i);
        let sep = usize::from(!out.is_empty());
        let needed = used + sep + line.chars().count() + 1 + tail.chars().count();
        if needed > FIELD_VALUE_LIMIT {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&tail);
            return out;
        }
        if sep == 1 {
            out.push('\n');
        }
        out.push_str(line);
        used += sep + line.chars().count();
    }
    out
}

/// Mention prefix and the matching allow-list so only that mention pings.
pub fn mention(discord: &Discord) -> (Option<String>, AllowedMentions) {
    match (discord.effective_mention(), discord.role_id.as_deref()) {
        (MentionMode::Role, Some(role)) => (
            Some(format!("<@&{}>", role)),
            AllowedMentions {
                everyone: false,
                roles: vec![role.to_string()],
            },
        ),
        (MentionMode::Everyone, _) => (
            Some("@everyone".to_string()),
            AllowedMentions {
                everyone: true,
                roles: vec![],
            },
        ),
        _ => (None, AllowedMentions::default()),
    }
}

pub fn render(order_id: &OrderId, details: &OrderDetails, discord: &Discord) -> OutgoingMessage {
    let (content, allowed_mentions) = mention(discord);
    let embed = Embed {
        title: Some(format!("New Order: {}", order_id)),
        color: Some(EMBED_COLOR),
        fields: vec![
            EmbedField {
                name: FIELD_BUYER.to_string(),
                value: details.buyer.clone(),
                inline: true,
            },
            EmbedField {
                name: FIELD_ORDER_ID.to_string(),
                value: order_id.to_string(),
                inline: true,
            },
            EmbedField {
                name: FIELD_ITEMS.to_string(),
                value: render_items(&details.items),
                inline: false,
            },
        ],
    };
    OutgoingMessage {
        content,
        embeds: vec![embed],
        allowed_mentions: Some(allowed_mentions),
    }
}

/// Post the notification, then attach the status reactions best-effort.
///
/// The order counts as dispatched once the message exists; a failed or slow
/// reaction is logged and skipped.
#[instrument(skip_all, fields(order_id = %order_id))]
pub async fn dispatch_order(
    chat: &dyn ChatService,
    discord: &Discord,
    order_id: &OrderId,
    details: &OrderDetails,
) -> Result<ChatMessage> {
    let message = render(order_id, details, discord);
    let posted = chat
        .send_message(&discord.channel_id, &message)
        .await
        .context("failed to post order notification")?;
    info!(message_id = %posted.id, "posted order notification");

    for status in OrderStatus::ALL {
        let attach = chat.add_reaction(&discord.channel_id, &posted.id, status.emoji());
        match tokio::time::timeout(REACTION_TIMEOUT, attach).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(?err, emoji = status.emoji(), "failed to add reaction"),
            Err(_) => warn!(emoji = status.emoji(), "timed out adding reaction"),
        }
    }
    Ok(posted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discord(role: Option<&str>, mode: Option<MentionMode>) -> Discord {
        Discord {
            bot_token: "t".into(),
            channel_id: "c".into(),
            role_id: role.map(str::to_string),
            mention: mode,
        }
    }

    fn details(items: Vec<OrderItem>) -> OrderDetails {
        OrderDetails {
            buyer: "Jane Doe".into(),
            items,
        }
    }

    #[test]
    fn renders_embed_fields() {
        let id: OrderId = "AB12CD34-56EF78-90AB1".parse().unwrap();
        let msg = render(
            &id,
            &details(vec![OrderItem::new("Booster Box", "2", "$89.99")]),
            &discord(None, Some(MentionMode::None)),
        );
        let embed = &msg.embeds[0];
        assert_eq!(embed.title.as_deref(), Some("New Order: AB12CD34-56EF78-90AB1"));
        assert_eq!(embed.color, Some(0x3498db));
        assert_eq!(embed.field(FIELD_BUYER), Some("Jane Doe"));
        assert_eq!(embed.field(FIELD_ORDER_ID), Some("AB12CD34-56EF78-90AB1"));
        assert_eq!(embed.field(FIELD_ITEMS), Some("2x Booster Box — $89.99"));
        assert!(msg.content.is_none());
    }

    #[test]
    fn empty_items_use_placeholder() {
        assert_eq!(render_items(&[]), NO_ITEMS);
    }

    #[test]
    fn long_item_lists_are_truncated() {
        let items: Vec<OrderItem> = (0..100)
            .map(|i| OrderItem::new(format!("Card number {i:03} with a long name"), "1", "$0.25"))
            .collect();
        let text = render_items(&items);
        assert!(text.chars().count() <= FIELD_VALUE_LIMIT);
        assert!(text.starts_with("1x Card number 000"));
        let tail = text.lines().last().unwrap();
        assert!(tail.starts_with("…and "), "{tail}");
        let shown = text.lines().count() - 1;
        assert_eq!(tail, format!("…and {} more", 100 - shown));
    }

    #[test]
    fn mention_modes() {
        let (content, allowed) = mention(&discord(Some("99"), None));
        assert_eq!(content.as_deref(), Some("<@&99>"));
        assert_eq!(allowed.roles, vec!["99".to_string()]);

        let (content, allowed) = mention(&discord(None, None));
        assert_eq!(content.as_deref(), Some("@everyone"));
        assert!(allowed.everyone);

        let (content, allowed) = mention(&discord(Some("99"), Some(MentionMode::None)));
        assert!(content.is_none());
        assert_eq!(allowed, AllowedMentions::default());
    }
}
