//! Configuration management for Quakewatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer a `quakewatch.toml` file, environment variables, and
//! command-line arguments over the built-in defaults.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Base URL the alert's map link is built from.
    pub map_url: String,
    /// Configuration for the hazard event feed.
    pub feed: FeedConfig,
    /// Configuration for the reverse-geocoding service.
    pub geocode: GeocodeConfig,
    /// Configuration for the Telegram gateway.
    pub telegram: TelegramConfig,
    /// Configuration for the persistent store.
    pub database: DatabaseConfig,
    /// Tick intervals of the periodic tasks.
    pub scheduler: SchedulerConfig,
    /// Configuration for delivery ledger retention.
    pub retention: RetentionConfig,
}

/// Configuration for the hazard event feed.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedConfig {
    /// The URL of the GeoJSON event feed.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

/// Configuration for the reverse-geocoding service.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeocodeConfig {
    /// The URL of the reverse-geocoding endpoint.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

/// Configuration for the Telegram gateway.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    /// Base URL up to and including the `/bot` prefix.
    pub api_url: String,
    /// The bot token. Usually supplied via `QUAKEWATCH_TELEGRAM.TOKEN`.
    pub token: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

/// Configuration for the persistent store.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    pub url: String,
}

/// Tick intervals of the periodic tasks.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchedulerConfig {
    /// Seconds between alert dispatch ticks.
    pub dispatch_interval_seconds: u64,
    /// Seconds between update ingestion ticks.
    pub ingest_interval_seconds: u64,
}

/// Configuration for delivery ledger retention.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetentionConfig {
    /// Delivery records older than this are pruned.
    pub max_age_hours: u64,
    /// Seconds between retention sweeps.
    pub sweep_interval_seconds: u64,
}

impl Config {
    /// Loads the application configuration by layering sources: defaults,
    /// TOML file, environment, and CLI arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .as_deref()
            .unwrap_or_else(|| std::path::Path::new("quakewatch.toml"));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // Allow overriding with environment variables, e.g.
            // QUAKEWATCH_TELEGRAM.TOKEN=123:abc
            .merge(Env::prefixed("QUAKEWATCH_"))
            .merge(cli)
            .extract()?;
        Ok(config)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            map_url: "https://www.openstreetmap.org".to_string(),
            feed: FeedConfig {
                url: "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_hour.geojson"
                    .to_string(),
                timeout_seconds: 10,
            },
            geocode: GeocodeConfig {
                url: "https://nominatim.openstreetmap.org/reverse".to_string(),
                timeout_seconds: 10,
            },
            telegram: TelegramConfig {
                api_url: "https://api.telegram.org/bot".to_string(),
                token: String::new(),
                timeout_seconds: 5,
            },
            database: DatabaseConfig {
                url: "sqlite:quakewatch.db?mode=rwc".to_string(),
            },
            scheduler: SchedulerConfig {
                dispatch_interval_seconds: 15,
                ingest_interval_seconds: 14,
            },
            retention: RetentionConfig {
                max_age_hours: 24,
                sweep_interval_seconds: 3600,
            },
        }
    }
}
