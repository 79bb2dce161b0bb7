use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use tcg_orderbot::config;
use tcg_orderbot::model::OrderId;
use tcg_orderbot::scraper::{OrderScraper, PortalScraper};

#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Order to scrape
    #[arg(long)]
    order_id: OrderId,
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
    let portal = config::load_portal(Some(&args.config))?;

    let scraper = PortalScraper::new(portal);
    let details = scraper.scrape(&args.order_id).await?;
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}
