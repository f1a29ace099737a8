//! Delivery ledger retention sweep
//!
//! The ledger only needs to cover the feed's current event window; rows
//! older than the retention window are dead weight and are deleted on a
//! fixed schedule.

use crate::core::DeliveryLedger;
use crate::store::StoreError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Periodically prunes old delivery records.
pub struct RetentionSweeper {
    ledger: Arc<dyn DeliveryLedger>,
    max_age: Duration,
}

impl RetentionSweeper {
    pub fn new(ledger: Arc<dyn DeliveryLedger>, max_age: Duration) -> Self {
        Self { ledger, max_age }
    }

    /// Runs the sweep loop until shutdown.
    pub async fn run(self, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut timer = interval(period);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Retention sweeper received shutdown signal.");
                    break;
                }
                _ = timer.tick() => {
                    match self.run_tick().await {
                        Ok(0) => debug!("Retention sweep removed nothing"),
                        Ok(removed) => info!(removed, "Retention sweep removed old delivery records"),
                        Err(e) => warn!(error = %e, "Retention sweep failed"),
                    }
                }
            }
        }
    }

    /// One sweep; returns how many records were removed.
    pub async fn run_tick(&self) -> Result<u64, StoreError> {
        self.ledger.prune_older_than(self.max_age).await
    }
}
