use crate::geo::GeoPoint;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
struct TrackedPosition {
    current: GeoPoint,
    previous: Option<GeoPoint>,
}

/// Last two distinct positions per vehicle, for feeds that only report
/// where a vehicle is now.
///
/// Updates are numbered in the order their fetches were issued. Once update
/// `n` has run, any update numbered `n` or lower is refused, so a slow
/// response cannot roll a vehicle back to an older position.
#[derive(Debug, Default)]
pub struct PositionHistory {
    states: HashMap<String, TrackedPosition>,
    last_update: Option<u64>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            last_update: None,
        }
    }

    /// Claims update number `update`. Returns false, leaving the history
    /// untouched, if the same or a later update already ran.
    pub fn begin_update(&mut self, update: u64) -> bool {
        if self.last_update.is_some_and(|last| update <= last) {
            return false;
        }
        self.last_update = Some(update);
        true
    }

    /// Records `position` for `vehicle_id` and returns the vehicle's previous
    /// distinct position, if any. A stationary vehicle keeps its earlier
    /// previous position so its heading does not reset while stopped.
    pub fn observe(&mut self, vehicle_id: &str, position: GeoPoint) -> Option<GeoPoint> {
        match self.states.get_mut(vehicle_id) {
            Some(state) => {
                if state.current != position {
                    state.previous = Some(state.current);
                    state.current = position;
                }
                state.previous
            }
            None => {
                self.states.insert(
                    vehicle_id.to_string(),
                    TrackedPosition {
                        current: position,
                        previous: None,
                    },
                );
                None
            }
        }
    }

    /// Forgets vehicles that were not in the latest feed.
    pub fn retain_seen(&mut self, seen: &HashSet<String>) {
        self.states.retain(|id, _| seen.contains(id));
    }
}
