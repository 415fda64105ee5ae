use crate::error::FetchError;
use crate::realtime::{PositionSource, VehiclePosition};
use crate::render::{ApplyOutcome, Reconciler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

type FetchResult = (u64, Result<Vec<VehiclePosition>, FetchError>);

/// Polls `source` until `shutdown` is signalled or its sender is dropped.
///
/// The initial load is awaited before the timer starts, unless shutdown
/// arrives first. After that a fetch is issued every `poll_interval` whether
/// or not earlier fetches have finished; each carries a sequence number and
/// results older than the latest applied one are discarded by the
/// reconciler. On shutdown the reconciler is torn down so fetches still in
/// flight never write to it.
pub async fn run_fetcher<S: PositionSource>(
    source: Arc<S>,
    state: Arc<RwLock<Reconciler>>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_ms = poll_interval.as_millis() as u64,
        "starting realtime fetcher"
    );

    let mut sequence: u64 = 0;
    let initial = tokio::select! {
        biased;

        _ = shutdown.changed() => None,
        result = source.fetch_all_vehicles() => Some(result),
    };
    match initial {
        Some(result) => apply_result(&state, sequence, result).await,
        None => {
            state.write().await.teardown();
            info!("realtime fetcher stopped before initial load");
            return;
        }
    }

    let (tx, mut rx) = mpsc::channel::<FetchResult>(16);
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,
            Some((seq, result)) = rx.recv() => {
                apply_result(&state, seq, result).await;
            }
            _ = ticker.tick() => {
                sequence += 1;
                let source = source.clone();
                let tx = tx.clone();
                let seq = sequence;
                tokio::spawn(async move {
                    let result = source.fetch_all_vehicles().await;
                    // receiver is gone after shutdown
                    let _ = tx.send((seq, result)).await;
                });
            }
        }
    }

    state.write().await.teardown();
    info!(last_sequence = sequence, "realtime fetcher stopped");
}

async fn apply_result(
    state: &RwLock<Reconciler>,
    sequence: u64,
    result: Result<Vec<VehiclePosition>, FetchError>,
) {
    let mut reconciler = state.write().await;
    match reconciler.apply(sequence, result) {
        ApplyOutcome::Applied(outcome) => {
            info!(
                sequence,
                vehicles = outcome.vehicles,
                new_routes = outcome.new_routes.len(),
                "processed snapshot"
            );
        }
        ApplyOutcome::Stale { latest, .. } => {
            debug!(sequence, latest, "snapshot arrived out of order");
        }
        ApplyOutcome::Skipped | ApplyOutcome::Inactive => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Scripted = (Duration, Result<Vec<VehiclePosition>, reqwest::StatusCode>);

    /// Answers call `n` with `script[n]` after its delay; later calls never finish.
    struct ScriptedSource {
        calls: AtomicUsize,
        script: Vec<Scripted>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script,
            })
        }
    }

    impl PositionSource for ScriptedSource {
        async fn fetch_all_vehicles(&self) -> Result<Vec<VehiclePosition>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(call) {
                Some((delay, result)) => {
                    tokio::time::sleep(*delay).await;
                    result.clone().map_err(FetchError::Status)
                }
                None => std::future::pending().await,
            }
        }
    }

    fn bus(id: &str, route: &str, lat: f64) -> VehiclePosition {
        VehiclePosition {
            id: id.to_string(),
            route: route.to_string(),
            current: GeoPoint::new(lat, -117.0),
            previous: None,
        }
    }

    fn routes(reconciler: &Reconciler) -> Vec<String> {
        reconciler.legend().iter().map(|e| e.name.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn late_results_from_earlier_fetches_are_discarded() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(vec![bus("1", "B", 33.0), bus("2", "A", 33.0)])),
            // issued at t=5, lands at t=13
            (Duration::from_secs(8), Ok(vec![bus("1", "B", 30.0)])),
            // issued at t=10, lands at t=11
            (Duration::from_secs(1), Ok(vec![bus("1", "B", 33.1), bus("3", "C", 33.2)])),
        ]);
        let state = Arc::new(RwLock::new(Reconciler::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_fetcher(
            source,
            state.clone(),
            DEFAULT_POLL_INTERVAL,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(14)).await;

        {
            let reconciler = state.read().await;
            assert_eq!(reconciler.last_sequence(), Some(2));
            assert_eq!(routes(&reconciler), vec!["A", "B", "C"]);
            let lats: Vec<f64> = reconciler.records().iter().map(|r| r.latitude).collect();
            assert_eq!(lats, vec![33.1, 33.2]);
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_keeps_state_and_next_tick_retries() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(vec![bus("1", "A", 33.0)])),
            (Duration::ZERO, Err(reqwest::StatusCode::BAD_GATEWAY)),
            (Duration::ZERO, Ok(vec![bus("1", "A", 33.5), bus("2", "B", 33.5)])),
        ]);
        let state = Arc::new(RwLock::new(Reconciler::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_fetcher(
            source,
            state.clone(),
            DEFAULT_POLL_INTERVAL,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(6)).await;
        {
            let reconciler = state.read().await;
            assert_eq!(reconciler.last_sequence(), Some(0));
            assert_eq!(reconciler.records()[0].latitude, 33.0);
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        {
            let reconciler = state.read().await;
            assert_eq!(reconciler.last_sequence(), Some(2));
            assert_eq!(reconciler.records().len(), 2);
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetch_is_ignored_after_shutdown() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(vec![bus("1", "A", 33.0)])),
            // issued at t=5, lands at t=8
            (Duration::from_secs(3), Ok(vec![bus("2", "B", 34.0)])),
        ]);
        let state = Arc::new(RwLock::new(Reconciler::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_fetcher(
            source,
            state.clone(),
            DEFAULT_POLL_INTERVAL,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(6)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;

        let reconciler = state.read().await;
        assert!(!reconciler.is_active());
        assert_eq!(reconciler.records().len(), 1);
        assert_eq!(reconciler.records()[0].id, "1");
        assert!(reconciler.colors().color_of("B").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_stalled_initial_load() {
        // the first call never finishes
        let source = ScriptedSource::new(Vec::new());
        let state = Arc::new(RwLock::new(Reconciler::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_fetcher(
            source,
            state.clone(),
            DEFAULT_POLL_INTERVAL,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .expect("fetcher should stop on shutdown")
            .unwrap();

        let reconciler = state.read().await;
        assert!(!reconciler.is_active());
        assert_eq!(reconciler.last_sequence(), None);
    }
}
