//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! the `clap` crate. These arguments are parsed at startup and merged over
//! the configuration from the `quakewatch.toml` file and environment
//! variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// An earthquake alert fan-out bot for Telegram.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seconds between alert dispatch ticks.
    #[arg(long, value_name = "SECONDS")]
    pub dispatch_interval: Option<u64>,

    /// Seconds between update ingestion ticks.
    #[arg(long, value_name = "SECONDS")]
    pub ingest_interval: Option<u64>,

    /// SQLite connection URL.
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,
}

impl Provider for &Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut scheduler = Dict::new();
        if let Some(interval) = self.dispatch_interval {
            scheduler.insert("dispatch_interval_seconds".into(), Value::from(interval));
        }
        if let Some(interval) = self.ingest_interval {
            scheduler.insert("ingest_interval_seconds".into(), Value::from(interval));
        }

        let mut database = Dict::new();
        if let Some(url) = &self.database_url {
            database.insert("url".into(), Value::from(url.clone()));
        }

        let mut dict = Dict::new();
        if !scheduler.is_empty() {
            dict.insert("scheduler".into(), Value::Dict(Tag::Default, scheduler));
        }
        if !database.is_empty() {
            dict.insert("database".into(), Value::Dict(Tag::Default, database));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
