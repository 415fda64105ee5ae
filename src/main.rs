use clap::Parser;
use live_bus_map::api::server::{run_server, AppState};
use live_bus_map::config::{Args, Config, FeedFormat};
#[cfg(not(feature = "gtfs-rt"))]
use live_bus_map::error::ConfigError;
use live_bus_map::error::ServerError;
use live_bus_map::realtime::fetcher::run_fetcher;
#[cfg(feature = "gtfs-rt")]
use live_bus_map::realtime::GtfsRtSource;
use live_bus_map::realtime::{FeedSource, JsonFeedSource};
use live_bus_map::render::{Reconciler, RouteColorAllocator};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Config::try_from(Args::parse())?;
    info!(
        feed_url = %config.feed_url,
        feed_format = ?config.feed_format,
        poll_interval_secs = config.poll_interval.as_secs(),
        port = config.port,
        "starting live bus map"
    );

    // a request never outlives its poll tick
    let request_timeout = config.poll_interval;
    let source = Arc::new(match config.feed_format {
        FeedFormat::Json => {
            FeedSource::Json(JsonFeedSource::new(&config.feed_url, request_timeout)?)
        }
        #[cfg(feature = "gtfs-rt")]
        FeedFormat::GtfsRt => {
            FeedSource::GtfsRt(GtfsRtSource::new(&config.feed_url, request_timeout)?)
        }
        // rejected by Config::try_from
        #[cfg(not(feature = "gtfs-rt"))]
        FeedFormat::GtfsRt => return Err(ConfigError::GtfsRtUnavailable.into()),
    });

    let reconciler = Arc::new(RwLock::new(Reconciler::new(
        RouteColorAllocator::starting_at(config.first_color_index),
    )));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut fetcher_handle = tokio::spawn(run_fetcher(
        source,
        reconciler.clone(),
        config.poll_interval,
        shutdown_rx,
    ));

    let api_state = AppState {
        reconciler,
        map: Arc::new(config.map.clone()),
    };
    let port = config.port;
    let api_handle = tokio::spawn(async move { run_server(api_state, port).await });

    let outcome: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        result = &mut fetcher_handle => {
            error!("fetcher task exited");
            result?;
            return Err("fetcher task exited before shutdown".into());
        }
        result = api_handle => match result {
            Ok(Ok(())) => {
                error!("API server exited");
                Err(ServerError::Serve("server stopped".to_string()).into())
            }
            Ok(Err(e)) => {
                error!(error = %e, "API server failed");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = fetcher_handle.await;

    outcome
}
