use crate::error::ConfigError;
use crate::geo::GeoPoint;
use crate::realtime::fetcher::DEFAULT_POLL_INTERVAL;
use crate::render::colors::DEFAULT_FIRST_INDEX;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::time::Duration;

const MAX_ZOOM: u8 = 22;
const MAX_FIRST_COLOR_INDEX: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeedFormat {
    /// JSON array or id-keyed object of vehicle records
    Json,
    /// GTFS-RT VehiclePositions protobuf
    GtfsRt,
}

#[derive(Debug, Parser)]
#[command(name = "live-bus-map")]
#[command(about = "Live vehicle map backend")]
pub struct Args {
    /// Port to run the HTTP server on
    #[arg(short, long, env = "SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// URL of the vehicle position feed
    #[arg(long, env = "FEED_URL")]
    pub feed_url: String,

    #[arg(long, env = "FEED_FORMAT", value_enum, default_value = "json")]
    pub feed_format: FeedFormat,

    /// Seconds between snapshot fetches
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval_secs: u64,

    #[arg(long, env = "MAP_CENTER_LAT", default_value = "33.6846", allow_hyphen_values = true)]
    pub center_lat: f64,

    #[arg(long, env = "MAP_CENTER_LON", default_value = "-117.8265", allow_hyphen_values = true)]
    pub center_lon: f64,

    #[arg(long, env = "MAP_ZOOM", default_value = "13")]
    pub zoom: u8,

    /// Credential handed to the map tile widget
    #[arg(long, env = "MAP_API_KEY")]
    pub map_api_key: Option<String>,

    /// Color index given to the first route
    #[arg(long, env = "FIRST_COLOR_INDEX", default_value_t = DEFAULT_FIRST_INDEX)]
    pub first_color_index: u32,
}

/// What the front end needs to set up the map widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSettings {
    pub center: GeoPoint,
    pub zoom: u8,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub feed_url: String,
    pub feed_format: FeedFormat,
    pub poll_interval: Duration,
    pub first_color_index: u32,
    pub map: MapSettings,
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let center = GeoPoint::new(args.center_lat, args.center_lon);
        if !center.is_valid() {
            return Err(ConfigError::InvalidCenter {
                lat: args.center_lat,
                lon: args.center_lon,
            });
        }
        if args.zoom > MAX_ZOOM {
            return Err(ConfigError::InvalidZoom(args.zoom));
        }
        if args.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if args.first_color_index > MAX_FIRST_COLOR_INDEX {
            return Err(ConfigError::InvalidFirstColorIndex(args.first_color_index));
        }
        if args.feed_url.trim().is_empty() {
            return Err(ConfigError::EmptyFeedUrl);
        }
        if args.feed_format == FeedFormat::GtfsRt && !cfg!(feature = "gtfs-rt") {
            return Err(ConfigError::GtfsRtUnavailable);
        }

        Ok(Self {
            port: args.port,
            feed_url: args.feed_url,
            feed_format: args.feed_format,
            poll_interval: Duration::from_secs(args.poll_interval_secs),
            first_color_index: args.first_color_index,
            map: MapSettings {
                center,
                zoom: args.zoom,
                api_key: args.map_api_key.filter(|k| !k.is_empty()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["live-bus-map", "--feed-url", "http://localhost/buses.json"];
        argv.extend_from_slice(extra);
        Config::try_from(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.feed_format, FeedFormat::Json);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.first_color_index, DEFAULT_FIRST_INDEX);
        assert_eq!(config.map.zoom, 13);
    }

    #[test]
    fn negative_longitude() {
        let config = parse(&["--center-lon", "-118.25"]).unwrap();
        assert_eq!(config.map.center.lon, -118.25);
    }

    #[cfg(feature = "gtfs-rt")]
    #[test]
    fn gtfs_rt_format() {
        let config = parse(&["--feed-format", "gtfs-rt"]).unwrap();
        assert_eq!(config.feed_format, FeedFormat::GtfsRt);
    }

    #[cfg(not(feature = "gtfs-rt"))]
    #[test]
    fn gtfs_rt_format_needs_feature() {
        assert!(matches!(
            parse(&["--feed-format", "gtfs-rt"]),
            Err(ConfigError::GtfsRtUnavailable)
        ));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            parse(&["--center-lat", "91"]),
            Err(ConfigError::InvalidCenter { .. })
        ));
        assert!(matches!(
            parse(&["--zoom", "30"]),
            Err(ConfigError::InvalidZoom(30))
        ));
        assert!(matches!(
            parse(&["--poll-interval-secs", "0"]),
            Err(ConfigError::ZeroPollInterval)
        ));
    }

    #[test]
    fn first_color_index_is_bounded() {
        assert_eq!(parse(&["--first-color-index", "0"]).unwrap().first_color_index, 0);
        assert_eq!(
            parse(&["--first-color-index", "1000000"])
                .unwrap()
                .first_color_index,
            1_000_000
        );
        assert!(matches!(
            parse(&["--first-color-index", "4294967295"]),
            Err(ConfigError::InvalidFirstColorIndex(u32::MAX))
        ));
    }

    #[test]
    fn empty_api_key_is_none() {
        let config = parse(&["--map-api-key", ""]).unwrap();
        assert_eq!(config.map.api_key, None);
    }
}
