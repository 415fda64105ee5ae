use crate::geo::GeoPoint;

/// One vehicle as reported by a position source.
#[derive(Debug, Clone, PartialEq)]
pub struct VehiclePosition {
    pub id: String,
    pub route: String,
    pub current: GeoPoint,
    /// `None` the first time a vehicle is seen.
    pub previous: Option<GeoPoint>,
}
