pub mod fetcher;
#[cfg(feature = "gtfs-rt")]
pub mod gtfs_rt;
pub mod history;
pub mod source;
pub mod types;

#[cfg(feature = "gtfs-rt")]
pub use gtfs_rt::GtfsRtSource;
pub use history::PositionHistory;
pub use source::{FeedSource, JsonFeedSource, PositionSource};
pub use types::VehiclePosition;
