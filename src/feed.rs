//! Client for the upstream hazard event feed
//!
//! This module fetches the provider's current event window as a GeoJSON
//! document and parses it into [`HazardEvent`]s. There is no internal retry:
//! a failed fetch aborts the caller's dispatch tick, which retries from
//! scratch on its next run.

use crate::core::{EventSource, HazardEvent};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by the event feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("feed response did not parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("feature {id} has a malformed geometry")]
    Geometry { id: String },
}

/// Parses a raw feed document and extracts hazard events
///
/// # Arguments
/// * `text` - The raw GeoJSON string from the feed
///
/// # Returns
/// * `Ok(Vec<HazardEvent>)` with one event per feature
/// * `Err` if the JSON is malformed or a feature's coordinate triple is short
pub fn parse_feed(text: &str) -> Result<Vec<HazardEvent>, FeedError> {
    // Temporary structs for parsing the feed's GeoJSON structure
    #[derive(Deserialize)]
    struct FeedDocument {
        features: Vec<Feature>,
    }

    #[derive(Deserialize)]
    struct Feature {
        id: String,
        geometry: Geometry,
        properties: Properties,
    }

    #[derive(Deserialize)]
    struct Geometry {
        coordinates: Vec<f64>,
    }

    #[derive(Deserialize)]
    struct Properties {
        title: String,
        mag: f64,
        #[serde(default)]
        tsunami: i64,
        time: i64,
    }

    let document: FeedDocument = serde_json::from_str(text)?;

    document
        .features
        .into_iter()
        .map(|feature| {
            // The geometry is a [longitude, latitude, depth-km] triple.
            let coordinates = &feature.geometry.coordinates;
            if coordinates.len() < 3 {
                return Err(FeedError::Geometry { id: feature.id });
            }
            Ok(HazardEvent {
                longitude: coordinates[0],
                latitude: coordinates[1],
                depth_km: coordinates[2],
                id: feature.id,
                magnitude: feature.properties.mag,
                title: feature.properties.title,
                time_ms: feature.properties.time,
                tsunami: feature.properties.tsunami != 0,
            })
        })
        .collect()
}

/// HTTP client for a USGS-shaped GeoJSON event feed.
pub struct UsgsFeedClient {
    url: String,
    client: reqwest::Client,
}

impl UsgsFeedClient {
    /// Creates a new feed client with a bounded per-request timeout.
    pub fn new(url: String, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl EventSource for UsgsFeedClient {
    async fn fetch_latest(&self) -> Result<Vec<HazardEvent>, FeedError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FeedError::Status { status, body });
        }

        let events = parse_feed(&body)?;
        debug!(count = events.len(), "Fetched hazard events from feed");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE_FEED: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "us001",
                "geometry": {"type": "Point", "coordinates": [10.0, 20.0, 5.0]},
                "properties": {
                    "title": "M 5.2 - 10km N of X",
                    "mag": 5.2,
                    "place": "10km N of X",
                    "tsunami": 0,
                    "time": 1700000000000
                }
            },
            {
                "type": "Feature",
                "id": "jp002",
                "geometry": {"type": "Point", "coordinates": [139.7, 35.6, 42.1]},
                "properties": {
                    "title": "M 6.1 - near Tokyo",
                    "mag": 6.1,
                    "tsunami": 1,
                    "time": 1700000100000
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_feed_success() {
        let events = parse_feed(SAMPLE_FEED).expect("sample feed should parse");
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.id, "us001");
        assert_eq!(first.longitude, 10.0);
        assert_eq!(first.latitude, 20.0);
        assert_eq!(first.depth_km, 5.0);
        assert_eq!(first.magnitude, 5.2);
        assert!(!first.tsunami);
        assert_eq!(first.time_ms, 1_700_000_000_000);

        assert!(events[1].tsunami);
    }

    #[test]
    fn test_parse_feed_invalid_json() {
        let result = parse_feed(r#"{"features": ["#);
        assert!(matches!(result, Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_parse_feed_missing_properties() {
        let incomplete = r#"{
            "features": [
                {"id": "x1", "geometry": {"coordinates": [1.0, 2.0, 3.0]}, "properties": {}}
            ]
        }"#;
        assert!(parse_feed(incomplete).is_err());
    }

    #[test]
    fn test_parse_feed_short_coordinate_triple() {
        let short = r#"{
            "features": [
                {
                    "id": "x2",
                    "geometry": {"coordinates": [1.0, 2.0]},
                    "properties": {"title": "t", "mag": 1.0, "tsunami": 0, "time": 1}
                }
            ]
        }"#;
        let result = parse_feed(short);
        assert!(matches!(result, Err(FeedError::Geometry { ref id }) if id == "x2"));
    }

    #[test]
    fn test_parse_feed_empty_window() {
        let events = parse_feed(r#"{"features": []}"#).unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_latest_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED))
            .mount(&server)
            .await;

        let client =
            UsgsFeedClient::new(format!("{}/feed", server.uri()), Duration::from_secs(5)).unwrap();
        let events = client.fetch_latest().await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_latest_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let client =
            UsgsFeedClient::new(format!("{}/feed", server.uri()), Duration::from_secs(5)).unwrap();
        let result = client.fetch_latest().await;
        assert!(matches!(result, Err(FeedError::Status { status, .. }) if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn test_fetch_latest_garbage_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client =
            UsgsFeedClient::new(format!("{}/feed", server.uri()), Duration::from_secs(5)).unwrap();
        assert!(matches!(client.fetch_latest().await, Err(FeedError::Parse(_))));
    }
}
