//! The main application logic, decoupled from the entry point.
//!
//! `AppBuilder` wires the service seams together — the real HTTP clients and
//! SQLite store in production, overrides in tests — and spawns the periodic
//! tasks. `App` holds their handles until shutdown.

use crate::{
    config::Config,
    core::{EventSource, Geocoder, MessagingGateway},
    dispatcher::AlertDispatcher,
    feed::UsgsFeedClient,
    geocode::NominatimClient,
    ingest::UpdateIngestor,
    retention::RetentionSweeper,
    store::Database,
    telegram::TelegramClient,
};
use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A handle to the running application, containing all its task handles.
pub struct App {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown_tx: watch::Sender<bool>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Waits for ctrl-c and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received. Waiting for tasks to complete...");
        self.stop().await;
        Ok(())
    }

    /// Signals shutdown and waits for all tasks to finish their current tick.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);

        let task_names: Vec<&'static str> = self.handles.iter().map(|(name, _)| *name).collect();
        debug!(tasks = ?task_names, "Awaiting all tasks.");

        let results = join_all(self.handles.into_iter().map(|(_, handle)| handle)).await;
        for (name, result) in task_names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = name, "Task shut down gracefully."),
                Err(e) => error!(task_name = name, error = %e, "Task panicked during shutdown."),
            }
        }
        info!("All tasks shut down.");
    }
}

/// Builder for the main application.
///
/// This pattern separates constructing the application's components from
/// running them, and provides a convenient way to override components for
/// testing purposes.
pub struct AppBuilder {
    config: Config,
    database_override: Option<Arc<Database>>,
    source_override: Option<Arc<dyn EventSource>>,
    geocoder_override: Option<Arc<dyn Geocoder>>,
    gateway_override: Option<Arc<dyn MessagingGateway>>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            database_override: None,
            source_override: None,
            geocoder_override: None,
            gateway_override: None,
        }
    }

    /// Overrides the database for testing.
    pub fn database_override(mut self, database: Arc<Database>) -> Self {
        self.database_override = Some(database);
        self
    }

    /// Overrides the event source for testing.
    pub fn source_override(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source_override = Some(source);
        self
    }

    /// Overrides the geocoder for testing.
    pub fn geocoder_override(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder_override = Some(geocoder);
        self
    }

    /// Overrides the messaging gateway for testing.
    pub fn gateway_override(mut self, gateway: Arc<dyn MessagingGateway>) -> Self {
        self.gateway_override = Some(gateway);
        self
    }

    /// Builds all application components and spawns the periodic tasks.
    pub async fn build(self) -> Result<App> {
        let config = self.config;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let database = match self.database_override {
            Some(database) => database,
            None => {
                let database = Database::connect(&config.database.url).await?;
                database.migrate().await?;
                Arc::new(database)
            }
        };

        let source: Arc<dyn EventSource> = match self.source_override {
            Some(source) => source,
            None => Arc::new(UsgsFeedClient::new(
                config.feed.url.clone(),
                Duration::from_secs(config.feed.timeout_seconds),
            )?),
        };

        let geocoder: Arc<dyn Geocoder> = match self.geocoder_override {
            Some(geocoder) => geocoder,
            None => Arc::new(NominatimClient::new(
                config.geocode.url.clone(),
                Duration::from_secs(config.geocode.timeout_seconds),
            )?),
        };

        let gateway: Arc<dyn MessagingGateway> = match self.gateway_override {
            Some(gateway) => gateway,
            None => Arc::new(TelegramClient::new(
                config.telegram.api_url.clone(),
                config.telegram.token.clone(),
                Duration::from_secs(config.telegram.timeout_seconds),
            )?),
        };

        let dispatcher = AlertDispatcher::new(
            source,
            geocoder,
            database.clone(),
            database.clone(),
            gateway.clone(),
            config.map_url.clone(),
        );
        let ingestor = UpdateIngestor::new(gateway, database.clone());
        let sweeper = RetentionSweeper::new(
            database.clone(),
            Duration::from_secs(config.retention.max_age_hours * 60 * 60),
        );

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        handles.push((
            "AlertDispatcher",
            tokio::spawn(dispatcher.run(
                Duration::from_secs(config.scheduler.dispatch_interval_seconds),
                shutdown_rx.clone(),
            )),
        ));
        handles.push((
            "UpdateIngestor",
            tokio::spawn(ingestor.run(
                Duration::from_secs(config.scheduler.ingest_interval_seconds),
                shutdown_rx.clone(),
            )),
        ));
        handles.push((
            "RetentionSweeper",
            tokio::spawn(sweeper.run(
                Duration::from_secs(config.retention.sweep_interval_seconds),
                shutdown_rx,
            )),
        ));

        info!("Quakewatch initialized successfully. Watching for hazard events...");

        Ok(App {
            handles,
            shutdown_tx,
        })
    }
}
