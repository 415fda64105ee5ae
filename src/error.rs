//! Error types for the live map service.
//!
//! Fetch failures are recoverable: the poller logs them and skips the cycle.
//! Configuration errors are the only ones that stop the process.

/// A snapshot could not be fetched or decoded.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The feed could not be reached.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The feed answered with a non-success status.
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),

    /// The JSON body did not have the expected shape.
    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// The protobuf body could not be decoded.
    #[cfg(feature = "gtfs-rt")]
    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// A single vehicle record that cannot be rendered.
///
/// These are dropped one at a time; the rest of the snapshot still applies.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedPosition {
    #[error("record has no vehicle id")]
    MissingId,

    #[error("vehicle {0} has no route")]
    MissingRoute(String),

    #[error("vehicle {0} has no current latitude/longitude")]
    MissingCoordinates(String),

    #[error("vehicle {id} has invalid coordinates ({lat}, {lon})")]
    InvalidCoordinates { id: String, lat: f64, lon: f64 },
}

/// Every color index up to `u32::MAX` has been handed out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no color index left for route {route}")]
pub struct ColorsExhausted {
    pub route: String,
}

/// Startup configuration is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("map center ({lat}, {lon}) is outside valid latitude/longitude range")]
    InvalidCenter { lat: f64, lon: f64 },

    #[error("zoom level {0} is outside 0..=22")]
    InvalidZoom(u8),

    #[error("poll interval must be at least one second")]
    ZeroPollInterval,

    #[error("first color index {0} is outside 0..=1000000")]
    InvalidFirstColorIndex(u32),

    #[error("feed url is empty")]
    EmptyFeedUrl,

    #[error("this build does not include GTFS-RT support (enable the `gtfs-rt` feature)")]
    GtfsRtUnavailable,
}

/// The HTTP API could not start or stopped serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(String),

    #[error("serve error: {0}")]
    Serve(String),
}
