use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::config::ParseMissPolicy;
use crate::context::AppContext;
use crate::dispatch::dispatch_order;
use crate::gmail::body::message_text;
use crate::model::OrderId;

/// What happened to one inbox message during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Scraped, posted and marked read.
    Dispatched(OrderId),
    /// Posted, but clearing UNREAD failed; it will be redispatched next cycle.
    DispatchedStillUnread(OrderId),
    /// No order id in the message.
    ParseMiss,
    /// Left unread for the next cycle.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub outcomes: Vec<(String, MessageOutcome)>,
}

impl CycleReport {
    pub fn dispatched(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| {
                matches!(
                    o,
                    MessageOutcome::Dispatched(_) | MessageOutcome::DispatchedStillUnread(_)
                )
            })
            .count()
    }
}

/// One pass over every unread notification. Only the search itself can fail
/// the cycle; per-message errors are contained and logged.
#[instrument(skip_all)]
pub async fn run_cycle(ctx: &AppContext) -> Result<CycleReport> {
    let query = ctx.config.gmail.query();
    let ids = ctx.inbox.search(&query).await?;
    if !ids.is_empty() {
        info!(count = ids.len(), "found unread order notifications");
    }

    let mut report = CycleReport::default();
    for id in ids {
        let outcome = process_message(ctx, &id).await;
        report.outcomes.push((id, outcome));
    }
    Ok(report)
}

#[instrument(skip_all, fields(message_id = %message_id))]
async fn process_message(ctx: &AppContext, message_id: &str) -> MessageOutcome {
    let message = match ctx.inbox.get_message(message_id).await {
        Ok(m) => m,
        Err(err) => {
            warn!(?err, "failed to fetch message");
            return MessageOutcome::Failed;
        }
    };

    let Some(order_id) = OrderId::extract(&message_text(&message)) else {
        warn!(snippet = %message.snippet, "no order id in notification");
        if ctx.config.app.parse_miss == ParseMissPolicy::MarkRead {
            if let Err(err) = ctx.inbox.mark_read(&[message_id.to_string()]).await {
                warn!(?err, "failed to mark unparsed message read");
            }
        }
        return MessageOutcome::ParseMiss;
    };

    let details = match ctx.scraper.scrape(&order_id).await {
        Ok(d) => d,
        Err(err) => {
            warn!(%order_id, %err, "scrape failed; leaving message unread");
            return MessageOutcome::Failed;
        }
    };

    if let Err(err) =
        dispatch_order(ctx.chat.as_ref(), &ctx.config.discord, &order_id, &details).await
    {
        warn!(%order_id, ?err, "dispatch failed; leaving message unread");
        return MessageOutcome::Failed;
    }

    match ctx.inbox.mark_read(&[message_id.to_string()]).await {
        Ok(()) => {
            info!(%order_id, "order processed");
            MessageOutcome::Dispatched(order_id)
        }
        Err(err) => {
            warn!(%order_id, ?err, "posted but failed to mark read");
            MessageOutcome::DispatchedStillUnread(order_id)
        }
    }
}

/// Poll until shutdown: full interval after a cycle, short recovery sleep
/// after a failed one.
pub async fn run(ctx: &AppContext, mut shutdown: watch::Receiver<bool>) {
    let poll_sleep = Duration::from_secs(ctx.config.app.poll_interval_secs);
    let recovery_sleep = Duration::from_secs(ctx.config.app.recovery_interval_secs);
    info!(interval = ?poll_sleep, "inbox poller started");

    loop {
        let sleep = match run_cycle(ctx).await {
            Ok(report) => {
                if report.dispatched() > 0 {
                    info!(dispatched = report.dispatched(), "cycle complete");
                }
                poll_sleep
            }
            Err(err) => {
                error!(?err, "poll cycle failed");
                recovery_sleep
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }
    info!("inbox poller stopped");
}
