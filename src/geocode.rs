//! Reverse-geocoding client
//!
//! Maps an event's coordinate pair to a [`Place`] via a Nominatim-shaped
//! HTTP service. Called once per event per dispatch tick, sequentially and
//! uncached; the dispatcher fails the whole tick if any resolution fails.

use crate::core::{Geocoder, Place};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Identifies the bot to the geocoding service, which rejects anonymous
/// clients.
const USER_AGENT: &str = "quakewatch/0.1";

/// Errors surfaced by the geocode resolver.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocode request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocode service returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("geocode response did not parse: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct GeoResponse {
    address: Address,
}

#[derive(Deserialize)]
struct Address {
    city: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
    country_code: String,
}

/// HTTP client for a Nominatim-shaped reverse-geocoding endpoint.
pub struct NominatimClient {
    url: String,
    client: reqwest::Client,
}

impl NominatimClient {
    /// Creates a new geocoding client with a bounded per-request timeout.
    pub fn new(url: String, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn resolve(&self, latitude: f64, longitude: f64) -> Result<Place, GeocodeError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
            ])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GeocodeError::Status { status, body });
        }

        let geo: GeoResponse = serde_json::from_str(&body)?;
        let place = Place {
            city: geo.address.city,
            county: geo.address.county,
            state: geo.address.state,
            country: geo.address.country,
            country_code: geo.address.country_code,
        };
        debug!(latitude, longitude, region = %place.country_code, "Resolved event region");
        Ok(place)
    }
}
