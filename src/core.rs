//! Core domain types and service traits for Quakewatch
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use crate::feed::FeedError;
use crate::geocode::GeocodeError;
use crate::store::StoreError;
use crate::telegram::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One detected hazard occurrence from the upstream feed.
///
/// Identity is the provider-assigned id. Events are fetched fresh each
/// dispatch tick and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HazardEvent {
    /// Provider-assigned unique id (e.g., "us7000kufc")
    pub id: String,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Hypocenter depth in kilometers
    pub depth_km: f64,
    /// Event magnitude
    pub magnitude: f64,
    /// Human-readable title (e.g., "M 5.2 - 10km N of X")
    pub title: String,
    /// Origin time in epoch milliseconds
    pub time_ms: i64,
    /// Whether the provider raised a tsunami flag for this event
    pub tsunami: bool,
}

/// Address information resolved from an event's coordinates.
///
/// All fields except the country code are optional in the upstream response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Place {
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    /// Lowercase two-letter country code; doubles as the region code
    pub country_code: String,
}

impl Place {
    /// The region code used for preference matching.
    pub fn region(&self) -> &str {
        &self.country_code
    }
}

/// Wildcard region preference matching every resolvable event.
pub const REGION_ALL: &str = "all";

/// A chat user registered with the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    /// Chat identifier, the unique key
    pub chat_id: i64,
    /// Display name captured from the first inbound message
    pub display_name: String,
    /// Selected region code, `"all"`, or `None` before the handshake completes
    pub region_preference: Option<String>,
    /// Whether the region-selection prompt has been sent (monotonic false→true)
    pub prompted: bool,
}

/// Onboarding state, observed indirectly through the store fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingState {
    /// No preference, no prompt sent yet
    New,
    /// Prompt sent, awaiting a keyboard selection
    Prompted,
    /// Preference committed; eligible for alerts
    Confirmed(String),
}

impl Subscriber {
    pub fn onboarding_state(&self) -> OnboardingState {
        match (&self.region_preference, self.prompted) {
            (Some(region), _) => OnboardingState::Confirmed(region.clone()),
            (None, true) => OnboardingState::Prompted,
            (None, false) => OnboardingState::New,
        }
    }
}

/// A single button on an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardButton {
    /// Label shown to the user
    pub label: String,
    /// Opaque payload returned in the selection callback
    pub callback_data: String,
}

/// Rows of buttons attached to a prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<KeyboardButton>>,
}

/// Formatting mode of an outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageMode {
    /// Plain text, no markup
    Plain,
    /// Emphasis markup (Telegram MarkdownV2)
    MarkdownV2,
    /// Plain text with an inline keyboard attachment
    Keyboard(InlineKeyboard),
}

/// An ephemeral, fully rendered message ready for the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    pub mode: MessageMode,
}

impl OutboundMessage {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            mode: MessageMode::Plain,
        }
    }

    pub fn markdown(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            mode: MessageMode::MarkdownV2,
        }
    }

    pub fn with_keyboard(chat_id: i64, text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            chat_id,
            text: text.into(),
            mode: MessageMode::Keyboard(keyboard),
        }
    }
}

/// One inbound update polled from the messaging gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatUpdate {
    /// Monotonically increasing gateway-assigned id
    pub update_id: i64,
    pub kind: UpdateKind,
}

/// What an inbound update carries.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// A new chat message; registers the sender as a subscriber
    NewChat { chat_id: i64, display_name: String },
    /// A keyboard selection committing a region preference
    Selection { chat_id: i64, region: String },
}

// =============================================================================
// Service Traits
// =============================================================================

/// Fetches the latest batch of hazard events from the upstream feed.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Returns the provider's full current event window.
    ///
    /// Stateless between calls; no internal retry. A failure aborts the
    /// caller's dispatch tick, which retries from scratch on its next run.
    async fn fetch_latest(&self) -> Result<Vec<HazardEvent>, FeedError>;
}

/// Resolves a coordinate pair to address information.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Reverse-geocodes the coordinates.
    ///
    /// # Returns
    /// * `Ok(Place)` with at least a country code on success
    /// * `Err` for transport, status, or response-shape failures
    async fn resolve(&self, latitude: f64, longitude: f64) -> Result<Place, GeocodeError>;
}

/// Bidirectional chat gateway: outbound messages and inbound updates.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Retrieves updates with an id greater than `offset`, oldest first.
    ///
    /// `None` asks for the gateway's full pending window.
    async fn poll_updates(&self, offset: Option<i64>) -> Result<Vec<ChatUpdate>, GatewayError>;

    /// Sends one rendered message.
    async fn send(&self, message: &OutboundMessage) -> Result<(), GatewayError>;
}

/// Persists subscriber identity, preference, handshake flag, and the ingest
/// cursor.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Registers a subscriber; a no-op if the chat id is already present.
    async fn upsert_subscriber(&self, chat_id: i64, display_name: &str) -> Result<(), StoreError>;

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Commits a region preference for the subscriber.
    async fn set_region_preference(&self, chat_id: i64, region: &str) -> Result<(), StoreError>;

    /// Sets the handshake-sent flag, only where it is currently unset.
    ///
    /// # Returns
    /// * `true` iff this call flipped the flag
    async fn mark_prompted(&self, chat_id: i64) -> Result<bool, StoreError>;

    /// Loads the persisted ingest cursor, if one has been saved.
    async fn load_cursor(&self) -> Result<Option<i64>, StoreError>;

    /// Persists the ingest cursor.
    async fn save_cursor(&self, last_update_id: i64) -> Result<(), StoreError>;
}

/// Records which (event, subscriber) pairs have already been notified.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Atomically records a pending delivery if the pair is absent.
    ///
    /// # Returns
    /// * `true` iff the record was inserted by this call; `false` means the
    ///   pair was already recorded (in either status) and must be skipped
    async fn reserve_delivery(&self, event_id: &str, chat_id: i64) -> Result<bool, StoreError>;

    /// Marks a reserved delivery as actually sent.
    async fn confirm_delivery(&self, event_id: &str, chat_id: i64) -> Result<(), StoreError>;

    /// Whether any record exists for the pair, pending or sent.
    async fn is_delivered(&self, event_id: &str, chat_id: i64) -> Result<bool, StoreError>;

    /// Deletes records older than `age`, returning how many were removed.
    async fn prune_older_than(&self, age: Duration) -> Result<u64, StoreError>;
}
