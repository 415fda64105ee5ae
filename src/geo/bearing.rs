use super::GeoPoint;
use std::f64::consts::TAU;

/// Marker heading for a vehicle at `current` whose last known position was
/// `reference`, in degrees clockwise from north within [0, 360).
///
/// This is the great-circle initial bearing at `current` toward `reference`.
/// Identical points give 0. Callers without a previous position pass the
/// current point as `reference` and get that fallback heading.
pub fn heading_between_points(current: GeoPoint, reference: GeoPoint) -> f64 {
    let lat1 = current.lat.to_radians();
    let lat2 = reference.lat.to_radians();
    let delta_lon = (reference.lon - current.lon).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    let bearing = (TAU + y.atan2(x)) % TAU;
    let degrees = bearing.to_degrees();

    // TAU - epsilon can round up to exactly 360.0 after conversion
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}
