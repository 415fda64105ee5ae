use crate::error::{FetchError, MalformedPosition};
use crate::geo::GeoPoint;
use crate::realtime::history::PositionHistory;
use crate::realtime::source::{build_client, fetch_body, PositionSource};
use crate::realtime::VehiclePosition;
use prost::Message;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// GTFS-RT `VehiclePositions` feed. The feed only carries current positions,
/// so previous positions come from a [`PositionHistory`] kept across fetches.
#[derive(Debug)]
pub struct GtfsRtSource {
    client: reqwest::Client,
    url: String,
    issued: AtomicU64,
    history: Mutex<PositionHistory>,
}

impl GtfsRtSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self::with_client(build_client(timeout)?, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            issued: AtomicU64::new(0),
            history: Mutex::new(PositionHistory::new()),
        }
    }
}

impl PositionSource for GtfsRtSource {
    async fn fetch_all_vehicles(&self) -> Result<Vec<VehiclePosition>, FetchError> {
        let update = self.issued.fetch_add(1, Ordering::SeqCst);
        let body = fetch_body(&self.client, &self.url).await?;
        let feed = gtfs_realtime::FeedMessage::decode(body.as_slice())?;

        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(positions_from_feed(&feed, &mut history, update))
    }
}

fn entity_position(
    entity_id: &str,
    vehicle: &gtfs_realtime::VehiclePosition,
) -> Result<(String, String, GeoPoint), MalformedPosition> {
    let descriptor = vehicle.vehicle.as_ref();
    let id = descriptor
        .and_then(|v| v.label.clone().or_else(|| v.id.clone()))
        .or_else(|| Some(entity_id.to_string()).filter(|id| !id.is_empty()))
        .ok_or(MalformedPosition::MissingId)?;

    let route = vehicle
        .trip
        .as_ref()
        .and_then(|t| t.route_id.clone())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| MalformedPosition::MissingRoute(id.clone()))?;

    let position = vehicle
        .position
        .as_ref()
        .ok_or_else(|| MalformedPosition::MissingCoordinates(id.clone()))?;
    let current = GeoPoint::new(position.latitude as f64, position.longitude as f64);
    if !current.is_valid() {
        return Err(MalformedPosition::InvalidCoordinates {
            id,
            lat: current.lat,
            lon: current.lon,
        });
    }

    Ok((id, route, current))
}

/// Converts a decoded feed into vehicle positions, recording them in
/// `history` as update number `update`. A feed older than the last one
/// recorded leaves the history alone and reports no previous positions.
pub fn positions_from_feed(
    feed: &gtfs_realtime::FeedMessage,
    history: &mut PositionHistory,
    update: u64,
) -> Vec<VehiclePosition> {
    let current_update = history.begin_update(update);
    if !current_update {
        debug!(update, "feed superseded by a newer fetch, history unchanged");
    }

    let mut seen = HashSet::new();
    let mut vehicles = Vec::new();

    for entity in &feed.entity {
        if entity.is_deleted == Some(true) {
            continue;
        }
        let Some(vehicle) = &entity.vehicle else {
            continue;
        };

        match entity_position(&entity.id, vehicle) {
            Ok((id, route, current)) => {
                let previous = if current_update {
                    history.observe(&id, current)
                } else {
                    None
                };
                seen.insert(id.clone());
                vehicles.push(VehiclePosition {
                    id,
                    route,
                    current,
                    previous,
                });
            }
            Err(e) => warn!(entity = %entity.id, error = %e, "dropping malformed vehicle entity"),
        }
    }

    if current_update {
        history.retain_seen(&seen);
    }
    vehicles
}
