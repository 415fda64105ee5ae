use crate::error::FetchError;
use crate::geo::heading_between_points;
use crate::realtime::VehiclePosition;
use crate::render::colors::RouteColorAllocator;
use crate::render::legend::{project_legend, LegendEntry};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What the map draws for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRecord {
    pub id: String,
    pub route: String,
    pub latitude: f64,
    pub longitude: f64,
    pub heading_degrees: f64,
    pub color_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    pub vehicles: usize,
    pub new_routes: Vec<String>,
}

impl ReconcileOutcome {
    pub fn legend_changed(&self) -> bool {
        !self.new_routes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(ReconcileOutcome),
    /// The fetch failed; previous render state was kept.
    Skipped,
    /// A result from a newer fetch was already applied.
    Stale { sequence: u64, latest: u64 },
    /// Arrived after teardown.
    Inactive,
}

/// Owns the render state: records, route colors and legend.
#[derive(Debug)]
pub struct Reconciler {
    colors: RouteColorAllocator,
    records: Vec<RenderRecord>,
    legend: Vec<LegendEntry>,
    last_sequence: Option<u64>,
    loaded: bool,
    active: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(RouteColorAllocator::new())
    }
}

impl Reconciler {
    pub fn new(colors: RouteColorAllocator) -> Self {
        let legend = project_legend(&colors);
        Self {
            colors,
            records: Vec::new(),
            legend,
            last_sequence: None,
            loaded: false,
            active: true,
        }
    }

    /// First snapshot: sorted by route so first-run colors are reproducible
    /// for a given data set.
    pub fn initial_load(&mut self, mut vehicles: Vec<VehiclePosition>) -> ReconcileOutcome {
        vehicles.sort_by(|a, b| a.route.cmp(&b.route));
        self.loaded = true;
        self.reconcile(vehicles)
    }

    /// Replaces the render state with one record per vehicle in `vehicles`.
    pub fn reconcile(&mut self, vehicles: Vec<VehiclePosition>) -> ReconcileOutcome {
        let mut new_routes = Vec::new();
        let mut records = Vec::with_capacity(vehicles.len());

        for vehicle in vehicles {
            match self.colors.allocate(&vehicle.route) {
                Ok(true) => new_routes.push(vehicle.route.clone()),
                Ok(false) => {}
                Err(e) => {
                    warn!(vehicle = %vehicle.id, error = %e, "dropping vehicle without a color");
                    continue;
                }
            }
            let Some(color_index) = self.colors.color_of(&vehicle.route) else {
                continue;
            };

            let reference = vehicle.previous.unwrap_or(vehicle.current);
            let heading_degrees = heading_between_points(vehicle.current, reference);

            records.push(RenderRecord {
                latitude: vehicle.current.lat,
                longitude: vehicle.current.lon,
                id: vehicle.id,
                route: vehicle.route,
                heading_degrees,
                color_index,
            });
        }

        if !new_routes.is_empty() {
            self.legend = project_legend(&self.colors);
            info!(routes = ?new_routes, total = self.colors.len(), "allocated route colors");
        }

        self.records = records;

        ReconcileOutcome {
            vehicles: self.records.len(),
            new_routes,
        }
    }

    /// Applies the result of fetch number `sequence`.
    pub fn apply(
        &mut self,
        sequence: u64,
        result: Result<Vec<VehiclePosition>, FetchError>,
    ) -> ApplyOutcome {
        if !self.active {
            debug!(sequence, "ignoring snapshot after teardown");
            return ApplyOutcome::Inactive;
        }

        if let Some(latest) = self.last_sequence {
            if sequence <= latest {
                debug!(sequence, latest, "discarding stale snapshot");
                return ApplyOutcome::Stale { sequence, latest };
            }
        }

        let vehicles = match result {
            Ok(vehicles) => vehicles,
            Err(e) => {
                warn!(sequence, error = %e, "snapshot fetch failed, keeping previous state");
                return ApplyOutcome::Skipped;
            }
        };

        self.last_sequence = Some(sequence);
        let outcome = if self.loaded {
            self.reconcile(vehicles)
        } else {
            self.initial_load(vehicles)
        };

        ApplyOutcome::Applied(outcome)
    }

    pub fn teardown(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn records(&self) -> &[RenderRecord] {
        &self.records
    }

    pub fn legend(&self) -> &[LegendEntry] {
        &self.legend
    }

    pub fn colors(&self) -> &RouteColorAllocator {
        &self.colors
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }
}
