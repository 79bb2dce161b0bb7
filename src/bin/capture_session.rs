//! One-time interactive login: opens a visible browser on the portal login
//! page, waits for the operator, then saves cookies and local storage.
use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tcg_orderbot::config;
use tcg_orderbot::scraper::connect_browser;
use tcg_orderbot::scraper::session::{OriginState, StorageEntry, StorageState, StoredCookie};

#[derive(Debug, Parser)]
#[command(author, version, about = "Log in to the seller portal and save the session")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Where to write the session; defaults to portal.session_path
    #[arg(long)]
    out: Option<PathBuf>,
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
    let out = args.out.unwrap_or_else(|| portal.session_path.clone());

    let client = connect_browser(&portal.webdriver_url, false).await?;
    let captured = capture(&client, &portal.login_url(), &portal.base_url).await;
    if let Err(err) = client.close().await {
        warn!(?err, "failed to close browser session");
    }

    let state = captured?;
    state
        .save(&out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!(path = %out.display(), cookies = state.cookies.len(), "session saved");
    Ok(())
}

async fn capture(client: &fantoccini::Client, login_url: &str, base_url: &str) -> Result<StorageState> {
    client.goto(login_url).await?;

    println!("Log in in the browser window. Once the dashboard is shown, press ENTER here.");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read from stdin")?;

    let cookies = client
        .get_all_cookies()
        .await?
        .iter()
        .map(StoredCookie::from_webdriver)
        .collect();

    let origin = Url::parse(base_url)
        .context("invalid portal base url")?
        .origin()
        .ascii_serialization();
    let raw = client
        .execute("return Object.entries(window.localStorage);", vec![])
        .await?;
    let local_storage = local_storage_entries(&raw);

    Ok(StorageState {
        cookies,
        origins: vec![OriginState {
            origin,
            local_storage,
        }],
    })
}

fn local_storage_entries(raw: &Value) -> Vec<StorageEntry> {
    raw.as_array()
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|pair| {
                    let name = pair.get(0)?.as_str()?;
                    let value = pair.get(1)?.as_str()?;
                    Some(StorageEntry {
                        name: name.to_string(),
                        value: value.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
