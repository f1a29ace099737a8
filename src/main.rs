//! Quakewatch - Earthquake alert bot for Telegram
//!
//! Polls the USGS hazard feed and fans alerts out to subscribed chats,
//! filtered by each subscriber's region preference.

use anyhow::Result;
use clap::Parser;
use quakewatch::{app::App, cli::Cli, config::Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment,
    // and CLI args.
    let config = Config::load(&cli)?;

    // Initialize logging
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Quakewatch starting up...");

    // Log the loaded configuration settings for visibility
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Feed URL: {}", config.feed.url);
    info!("Geocode URL: {}", config.geocode.url);
    info!("Database URL: {}", config.database.url);
    info!(
        "Dispatch Interval: {}s",
        config.scheduler.dispatch_interval_seconds
    );
    info!(
        "Ingest Interval: {}s",
        config.scheduler.ingest_interval_seconds
    );
    info!(
        "Retention: {}h, swept every {}s",
        config.retention.max_age_hours, config.retention.sweep_interval_seconds
    );
    info!(
        "Telegram Token: {}",
        if config.telegram.token.is_empty() {
            "NOT SET"
        } else {
            "set"
        }
    );
    info!("-------------------------------------------------------");

    if config.telegram.token.is_empty() {
        anyhow::bail!("telegram.token is not configured");
    }

    let app = App::builder(config).build().await?;
    app.run().await
}
