use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use tcg_orderbot::config;
use tcg_orderbot::context::AppContext;
use tcg_orderbot::discord::gateway;
use tcg_orderbot::{poller, reactions};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let ctx = Arc::new(AppContext::init(cfg).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(64);

    // Gateway connection feeding the reaction watcher
    let token = ctx.config.discord.bot_token.clone();
    let gateway_shutdown = shutdown_rx.clone();
    let gateway_task = tokio::spawn(async move {
        if let Err(err) = gateway::run(&token, events_tx, gateway_shutdown).await {
            error!(?err, "gateway stopped; status reactions are no longer announced");
        }
    });

    let watcher_ctx = ctx.clone();
    let watcher_shutdown = shutdown_rx.clone();
    let watcher_task = tokio::spawn(async move {
        reactions::run(&watcher_ctx, events_rx, watcher_shutdown).await;
    });

    let poller_ctx = ctx.clone();
    let poller_task = tokio::spawn(async move {
        poller::run(&poller_ctx, shutdown_rx).await;
    });

    info!("order bot running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    for (name, task) in [
        ("gateway", gateway_task),
        ("reaction watcher", watcher_task),
        ("poller", poller_task),
    ] {
        if let Err(err) = task.await {
            error!(?err, task = name, "task ended abnormally");
        }
    }
    Ok(())
}
