//! Shared fakes and builders for integration tests.

use async_trait::async_trait;
use quakewatch::config::Config;
use quakewatch::core::{EventSource, Geocoder, HazardEvent, Place};
use quakewatch::feed::FeedError;
use quakewatch::geocode::GeocodeError;
use quakewatch::store::Database;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An event source serving a fixed in-memory window.
pub struct FakeFeed {
    events: Mutex<Vec<HazardEvent>>,
}

impl FakeFeed {
    pub fn new(events: Vec<HazardEvent>) -> Self {
        Self {
            events: Mutex::new(events),
        }
    }
}

#[async_trait]
impl EventSource for FakeFeed {
    async fn fetch_latest(&self) -> Result<Vec<HazardEvent>, FeedError> {
        Ok(self.events.lock().unwrap().clone())
    }
}

/// A geocoder answering from a fixed coordinate table.
#[derive(Default)]
pub struct FakeGeocoder {
    places: Mutex<HashMap<(u64, u64), Place>>,
}

impl FakeGeocoder {
    pub fn with_region(self, latitude: f64, longitude: f64, region: &str) -> Self {
        let place = Place {
            state: Some("Somewhere".to_string()),
            country: Some("Someland".to_string()),
            country_code: region.to_string(),
            ..Place::default()
        };
        self.places
            .lock()
            .unwrap()
            .insert((latitude.to_bits(), longitude.to_bits()), place);
        self
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn resolve(&self, latitude: f64, longitude: f64) -> Result<Place, GeocodeError> {
        Ok(self
            .places
            .lock()
            .unwrap()
            .get(&(latitude.to_bits(), longitude.to_bits()))
            .cloned()
            .expect("no fake place registered for coordinates"))
    }
}

/// A hazard event at the given coordinates with fixed severity fields.
pub fn event(id: &str, latitude: f64, longitude: f64) -> HazardEvent {
    HazardEvent {
        id: id.to_string(),
        longitude,
        latitude,
        depth_km: 5.0,
        magnitude: 5.2,
        title: format!("M 5.2 - near {}", id),
        time_ms: 1_700_000_000_000,
        tsunami: false,
    }
}

/// A config pointed at a mock Telegram server, with one-second tick
/// intervals so integration tests complete quickly.
pub fn test_config(telegram_uri: &str) -> Config {
    let mut config = Config::default();
    config.telegram.api_url = format!("{}/bot", telegram_uri);
    config.telegram.token = "TEST".to_string();
    config.scheduler.dispatch_interval_seconds = 1;
    config.scheduler.ingest_interval_seconds = 1;
    config
}

/// A migrated in-memory database on a single-connection pool.
pub async fn memory_db() -> Arc<Database> {
    let db = Database::connect_with_pool_size("sqlite::memory:", 1)
        .await
        .unwrap();
    db.migrate().await.unwrap();
    Arc::new(db)
}
