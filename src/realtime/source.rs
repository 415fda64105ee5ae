use crate::error::{FetchError, MalformedPosition};
use crate::geo::GeoPoint;
use crate::realtime::VehiclePosition;
#[cfg(feature = "gtfs-rt")]
use crate::realtime::gtfs_rt::GtfsRtSource;
use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Where snapshots come from. A call returns every live vehicle or fails as a
/// whole; malformed individual records are dropped by the implementation.
pub trait PositionSource: Send + Sync + 'static {
    fn fetch_all_vehicles(
        &self,
    ) -> impl Future<Output = Result<Vec<VehiclePosition>, FetchError>> + Send;
}

/// HTTP client whose requests give up after `timeout`, so a stalled feed
/// cannot hold a fetch open across many poll ticks.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub(crate) async fn fetch_body(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    Ok(response.bytes().await?.to_vec())
}

/// JSON document feed: an array of vehicle records, or an object of records
/// keyed by vehicle id.
#[derive(Debug, Clone)]
pub struct JsonFeedSource {
    client: reqwest::Client,
    url: String,
}

impl JsonFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self::with_client(build_client(timeout)?, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl PositionSource for JsonFeedSource {
    async fn fetch_all_vehicles(&self) -> Result<Vec<VehiclePosition>, FetchError> {
        let body = fetch_body(&self.client, &self.url).await?;
        parse_json_feed(&body)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVehicle {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    route: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    last_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    last_longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    previous_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    previous_longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonFeed {
    List(Vec<Option<RawVehicle>>),
    // serde_json's preserve_order keeps document order
    Keyed(serde_json::Map<String, serde_json::Value>),
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl RawVehicle {
    fn into_position(self, key: Option<String>) -> Result<VehiclePosition, MalformedPosition> {
        let id = self.id.or(key).ok_or(MalformedPosition::MissingId)?;
        let route = self
            .route
            .ok_or_else(|| MalformedPosition::MissingRoute(id.clone()))?;

        let current = match (self.last_latitude, self.last_longitude) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
            _ => return Err(MalformedPosition::MissingCoordinates(id)),
        };
        if !current.is_valid() {
            return Err(MalformedPosition::InvalidCoordinates {
                id,
                lat: current.lat,
                lon: current.lon,
            });
        }

        // half-present or out of range previous positions count as absent
        let previous = match (self.previous_latitude, self.previous_longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)).filter(GeoPoint::is_valid),
            _ => None,
        };

        Ok(VehiclePosition {
            id,
            route,
            current,
            previous,
        })
    }
}

/// Decodes a JSON feed body, dropping records that cannot be rendered.
pub fn parse_json_feed(body: &[u8]) -> Result<Vec<VehiclePosition>, FetchError> {
    let feed: JsonFeed = serde_json::from_slice(body)?;

    let records: Vec<(Option<String>, RawVehicle)> = match feed {
        JsonFeed::List(list) => list.into_iter().flatten().map(|raw| (None, raw)).collect(),
        JsonFeed::Keyed(map) => map
            .into_iter()
            .filter_map(
                |(key, value)| match serde_json::from_value::<Option<RawVehicle>>(value) {
                    Ok(raw) => raw.map(|raw| (Some(key), raw)),
                    Err(e) => {
                        warn!(vehicle = %key, error = %e, "dropping malformed vehicle record");
                        None
                    }
                },
            )
            .collect(),
    };

    Ok(records
        .into_iter()
        .filter_map(|(key, raw)| match raw.into_position(key) {
            Ok(position) => Some(position),
            Err(e) => {
                warn!(error = %e, "dropping malformed vehicle record");
                None
            }
        })
        .collect())
}

/// Runtime-selected source.
#[derive(Debug)]
pub enum FeedSource {
    Json(JsonFeedSource),
    #[cfg(feature = "gtfs-rt")]
    GtfsRt(GtfsRtSource),
}

impl PositionSource for FeedSource {
    async fn fetch_all_vehicles(&self) -> Result<Vec<VehiclePosition>, FetchError> {
        match self {
            Self::Json(source) => source.fetch_all_vehicles().await,
            #[cfg(feature = "gtfs-rt")]
            Self::GtfsRt(source) => source.fetch_all_vehicles().await,
        }
    }
}
