//! Update ingestion loop
//!
//! Polls the messaging gateway for inbound updates, registers new
//! subscribers, and commits region-preference selections. The loop owns an
//! explicit cursor (the highest update id already processed) that is passed
//! into and returned from each tick and persisted through the store, so a
//! restart does not replay updates.

use crate::core::{MessagingGateway, OutboundMessage, SubscriberStore, UpdateKind};
use crate::formatting;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Registers subscribers and commits their selections from gateway updates.
pub struct UpdateIngestor {
    gateway: Arc<dyn MessagingGateway>,
    store: Arc<dyn SubscriberStore>,
}

impl UpdateIngestor {
    pub fn new(gateway: Arc<dyn MessagingGateway>, store: Arc<dyn SubscriberStore>) -> Self {
        Self { gateway, store }
    }

    /// Runs the ingestion loop until shutdown.
    ///
    /// The shutdown signal is observed between ticks; an in-flight tick
    /// always runs to completion.
    pub async fn run(self, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut cursor = match self.store.load_cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(error = %e, "Failed to load ingest cursor, starting unset");
                None
            }
        };

        let mut timer = interval(period);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Update ingestion loop received shutdown signal.");
                    break;
                }
                _ = timer.tick() => {
                    cursor = self.run_tick(cursor).await;
                }
            }
        }
    }

    /// One ingestion tick; returns the advanced cursor.
    ///
    /// Polling failures are soft: the tick returns the cursor unchanged and
    /// the next tick retries. The cursor advances past every polled update
    /// regardless of its processing outcome, so one poisoned update cannot
    /// wedge the loop.
    pub async fn run_tick(&self, cursor: Option<i64>) -> Option<i64> {
        let updates = match self.gateway.poll_updates(cursor).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Polling gateway updates failed");
                return cursor;
            }
        };
        if updates.is_empty() {
            return cursor;
        }
        debug!(count = updates.len(), "Processing gateway updates");

        let mut cursor = cursor;
        for update in updates {
            cursor = Some(cursor.map_or(update.update_id, |seen| seen.max(update.update_id)));

            match update.kind {
                UpdateKind::NewChat {
                    chat_id,
                    display_name,
                } => {
                    if let Err(e) = self.store.upsert_subscriber(chat_id, &display_name).await {
                        error!(chat_id, error = %e, "Failed to register subscriber, skipping update");
                    }
                }
                UpdateKind::Selection { chat_id, region } => {
                    if let Err(e) = self.store.set_region_preference(chat_id, &region).await {
                        error!(chat_id, error = %e, "Failed to commit region preference, skipping update");
                        continue;
                    }
                    info!(chat_id, region = %region, "Committed region preference");

                    let confirmation =
                        OutboundMessage::plain(chat_id, formatting::confirmation_text(&region));
                    if let Err(e) = self.gateway.send(&confirmation).await {
                        // The preference is already committed; only the
                        // courtesy message is lost.
                        warn!(chat_id, error = %e, "Failed to send selection confirmation");
                    }
                }
            }
        }

        if let Some(last_update_id) = cursor {
            if let Err(e) = self.store.save_cursor(last_update_id).await {
                warn!(error = %e, "Failed to persist ingest cursor");
            }
        }
        cursor
    }
}
