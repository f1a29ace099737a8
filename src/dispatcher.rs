//! Alert dispatcher
//!
//! The orchestrator of the fan-out engine. Each tick fetches the feed's
//! current event window, resolves a region for every event up front,
//! and then walks the subscriber list: new subscribers get the one-time
//! region-selection prompt, confirmed subscribers get an alert for every
//! matching event that has not already been recorded in the delivery ledger.
//!
//! Delivery records are written before the send (reserve, then confirm once
//! the gateway accepted the message): a crash or gateway outage between the
//! two can suppress one delivery but can never duplicate one.

use crate::core::{
    DeliveryLedger, EventSource, Geocoder, HazardEvent, MessagingGateway, OnboardingState,
    OutboundMessage, Place, Subscriber, SubscriberStore, REGION_ALL,
};
use crate::formatting;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Fans hazard events out to matching subscribers.
pub struct AlertDispatcher {
    source: Arc<dyn EventSource>,
    geocoder: Arc<dyn Geocoder>,
    store: Arc<dyn SubscriberStore>,
    ledger: Arc<dyn DeliveryLedger>,
    gateway: Arc<dyn MessagingGateway>,
    map_base_url: String,
}

impl AlertDispatcher {
    pub fn new(
        source: Arc<dyn EventSource>,
        geocoder: Arc<dyn Geocoder>,
        store: Arc<dyn SubscriberStore>,
        ledger: Arc<dyn DeliveryLedger>,
        gateway: Arc<dyn MessagingGateway>,
        map_base_url: String,
    ) -> Self {
        Self {
            source,
            geocoder,
            store,
            ledger,
            gateway,
            map_base_url,
        }
    }

    /// Runs the dispatch loop until shutdown.
    ///
    /// The shutdown signal is observed between ticks; an in-flight tick
    /// always runs to its natural completion or failure point. An aborted
    /// tick is logged and the next tick retries from scratch.
    pub async fn run(self, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut timer = interval(period);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Alert dispatcher received shutdown signal.");
                    break;
                }
                _ = timer.tick() => {
                    if let Err(e) = self.run_tick().await {
                        warn!(error = %e, "Dispatch tick aborted");
                    }
                }
            }
        }
    }

    /// One dispatch tick.
    pub async fn run_tick(&self) -> Result<()> {
        let events = self
            .source
            .fetch_latest()
            .await
            .context("fetching hazard events")?;

        // Resolve every region before any subscriber is processed: a single
        // geocoding failure delays the whole batch instead of splitting it.
        let mut resolved = Vec::with_capacity(events.len());
        for event in events {
            let place = self
                .geocoder
                .resolve(event.latitude, event.longitude)
                .await
                .with_context(|| format!("resolving region for event {}", event.id))?;
            resolved.push((event, place));
        }

        let subscribers = self
            .store
            .list_subscribers()
            .await
            .context("listing subscribers")?;
        debug!(
            events = resolved.len(),
            subscribers = subscribers.len(),
            "Dispatch tick"
        );

        for subscriber in subscribers {
            match subscriber.onboarding_state() {
                OnboardingState::New => {
                    if let Err(e) = self.send_prompt(&subscriber).await {
                        warn!(
                            chat_id = subscriber.chat_id,
                            error = %e,
                            "Region prompt failed, skipping subscriber"
                        );
                    }
                }
                // Awaiting a selection via the ingestion loop.
                OnboardingState::Prompted => {}
                OnboardingState::Confirmed(preference) => {
                    if let Err(e) = self
                        .deliver_matching(&subscriber, &preference, &resolved)
                        .await
                    {
                        warn!(
                            chat_id = subscriber.chat_id,
                            error = %e,
                            "Alert delivery failed, skipping subscriber"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Sends the one-time region-selection prompt and flips the
    /// handshake-sent flag.
    async fn send_prompt(&self, subscriber: &Subscriber) -> Result<()> {
        let prompt = OutboundMessage::with_keyboard(
            subscriber.chat_id,
            formatting::PROMPT_TEXT,
            formatting::region_keyboard(),
        );
        self.gateway.send(&prompt).await?;

        if self.store.mark_prompted(subscriber.chat_id).await? {
            info!(chat_id = subscriber.chat_id, "Sent region-selection prompt");
        }
        Ok(())
    }

    /// Delivers every matching, not-yet-recorded event to one subscriber.
    async fn deliver_matching(
        &self,
        subscriber: &Subscriber,
        preference: &str,
        resolved: &[(HazardEvent, Place)],
    ) -> Result<()> {
        for (event, place) in resolved {
            if preference != REGION_ALL && preference != place.region() {
                continue;
            }

            // Atomic insert-if-absent: false means the pair was already
            // recorded (pending or sent) and must not be sent again.
            if !self
                .ledger
                .reserve_delivery(&event.id, subscriber.chat_id)
                .await?
            {
                continue;
            }

            let body = formatting::format_alert(event, place, &self.map_base_url);
            let message = OutboundMessage::markdown(subscriber.chat_id, body);
            if let Err(e) = self.gateway.send(&message).await {
                // The reservation stays in place: a missed delivery is
                // accepted over any duplicate send.
                warn!(
                    chat_id = subscriber.chat_id,
                    event_id = %event.id,
                    error = %e,
                    "Alert send failed, stopping this subscriber for the tick"
                );
                break;
            }

            if let Err(e) = self
                .ledger
                .confirm_delivery(&event.id, subscriber.chat_id)
                .await
            {
                warn!(
                    chat_id = subscriber.chat_id,
                    event_id = %event.id,
                    error = %e,
                    "Failed to confirm delivery record"
                );
            }
            info!(
                chat_id = subscriber.chat_id,
                event_id = %event.id,
                region = %place.region(),
                "Alert delivered"
            );
        }
        Ok(())
    }
}
