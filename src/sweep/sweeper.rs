//! Hard-limit sweeper

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::PositionCache;
use crate::config::{RiskConfig, SweepConfig};
use crate::exit::ExitCoordinator;
use crate::telemetry::{increment, record_latency, CounterMetric, LatencyMetric};

/// Counters from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Snapshots examined
    pub checked: usize,
    /// Exit requests handed to the coordinator
    pub exits_requested: usize,
    /// Snapshots skipped for missing or invalid data
    pub skipped: usize,
}

/// Whether a UTC instant, seen in the exchange-local offset, has reached
/// the cutoff time of day
pub fn past_cutoff(now_utc: DateTime<Utc>, utc_offset_minutes: i32, cutoff: NaiveTime) -> bool {
    // checked_mul: the seconds conversion itself can overflow an i32
    // before east_opt ever sees the value
    match utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
    {
        Some(offset) => now_utc.with_timezone(&offset).time() >= cutoff,
        None => {
            warn!(utc_offset_minutes, "Invalid UTC offset, time cutoff disabled");
            false
        }
    }
}

/// Periodic hard-limit checker over the whole cache
pub struct RiskSweeper {
    cache: Arc<PositionCache>,
    coordinator: Arc<ExitCoordinator>,
    risk: RiskConfig,
    sweep: SweepConfig,
}

/// Running sweeper task, stoppable
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to stop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl RiskSweeper {
    pub fn new(
        cache: Arc<PositionCache>,
        coordinator: Arc<ExitCoordinator>,
        risk: RiskConfig,
        sweep: SweepConfig,
    ) -> Self {
        Self {
            cache,
            coordinator,
            risk,
            sweep,
        }
    }

    /// Spawn the periodic sweep loop
    pub fn start(self: Arc<Self>) -> SweeperHandle {
        let (shutdown, mut stop_rx) = watch::channel(false);
        let sweeper = Arc::clone(&self);

        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(sweeper.sweep.period_secs));
            info!(period_secs = sweeper.sweep.period_secs, "Risk sweeper started");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            info!("Risk sweeper stopping");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let summary = sweeper.sweep_once().await;
                        debug!(
                            checked = summary.checked,
                            exits_requested = summary.exits_requested,
                            skipped = summary.skipped,
                            "Sweep pass complete"
                        );
                    }
                }
            }
        });

        SweeperHandle { shutdown, task }
    }

    /// One full pass over every cached position
    ///
    /// First matching rule wins, at most one exit request per position:
    /// hard stop-loss, then take-profit, then the time cutoff. Positions
    /// with missing or invalid pricing are logged and skipped; they never
    /// abort the rest of the pass.
    pub async fn sweep_once(&self) -> SweepSummary {
        let started = Instant::now();
        let now = Utc::now();
        let cutoff_reached = self
            .sweep
            .time_exit_cutoff
            .map(|cutoff| past_cutoff(now, self.sweep.utc_offset_minutes, cutoff))
            .unwrap_or(false);

        let mut summary = SweepSummary::default();
        for snapshot in self.cache.all() {
            summary.checked += 1;

            if !snapshot.is_valid() {
                warn!(
                    tracker_id = snapshot.tracker_id,
                    instrument = %snapshot.key(),
                    "Skipping position with invalid entry data"
                );
                summary.skipped += 1;
                continue;
            }
            if snapshot.current_ltp.is_none() {
                warn!(
                    tracker_id = snapshot.tracker_id,
                    instrument = %snapshot.key(),
                    "Skipping position with no price yet"
                );
                summary.skipped += 1;
                continue;
            }

            let reason = if snapshot.pnl_pct <= -self.risk.sl_pct {
                Some(format!("SL HIT {}%", snapshot.pnl_pct.normalize()))
            } else if snapshot.pnl_pct >= self.risk.tp_pct {
                Some(format!("TP HIT {}%", snapshot.pnl_pct.normalize()))
            } else if cutoff_reached {
                Some("time_exit".to_string())
            } else {
                None
            };

            if let Some(reason) = reason {
                summary.exits_requested += 1;
                increment(CounterMetric::SweepExitRequested);
                let resolution = self
                    .coordinator
                    .request_exit(snapshot.tracker_id, &reason)
                    .await;
                debug!(
                    tracker_id = snapshot.tracker_id,
                    reason,
                    resolution = ?resolution,
                    "Sweep exit resolved"
                );
            }
        }

        record_latency(LatencyMetric::SweepPass, started.elapsed());
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InstrumentKey;
    use crate::exit::{ExitError, ExitExecutor, ExitOutcome};
    use crate::tracker::{JsonTrackerStore, Tracker, TrackerStatus};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn tracker(id: i64) -> Tracker {
        Tracker {
            id,
            security_id: "45510".to_string(),
            segment: "NSE_FNO".to_string(),
            entry_price: dec!(150),
            quantity: 75,
            status: TrackerStatus::Active,
            high_water_mark_pnl: dec!(0),
            breakeven_locked: false,
            trailing_stop_price: None,
            exit_reason: None,
            exit_price: None,
            exited_at: None,
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(i64, String)>>,
    }

    impl RecordingExecutor {
        fn calls(&self) -> Vec<(i64, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExitExecutor for RecordingExecutor {
        async fn execute_exit(
            &self,
            tracker: &Tracker,
            reason: &str,
        ) -> Result<ExitOutcome, ExitError> {
            self.calls
                .lock()
                .unwrap()
                .push((tracker.id, reason.to_string()));
            Ok(ExitOutcome::success("filled"))
        }
    }

    struct Fixture {
        cache: Arc<PositionCache>,
        executor: Arc<RecordingExecutor>,
        store: Arc<JsonTrackerStore>,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn sweeper(&self, sweep: SweepConfig) -> RiskSweeper {
            let coordinator = Arc::new(ExitCoordinator::new(
                self.executor.clone(),
                self.store.clone(),
                Duration::from_secs(5),
            ));
            RiskSweeper::new(
                self.cache.clone(),
                coordinator,
                RiskConfig::default(),
                sweep,
            )
        }
    }

    async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonTrackerStore::open(dir.path().join("t.json")).unwrap());
        Fixture {
            cache: Arc::new(PositionCache::new()),
            executor: Arc::new(RecordingExecutor::default()),
            store,
            _dir: dir,
        }
    }

    fn no_cutoff() -> SweepConfig {
        SweepConfig {
            time_exit_cutoff: None,
            ..SweepConfig::default()
        }
    }

    fn cutoff_always() -> SweepConfig {
        SweepConfig {
            time_exit_cutoff: NaiveTime::from_hms_opt(0, 0, 0),
            ..SweepConfig::default()
        }
    }

    #[test]
    fn test_past_cutoff_ist() {
        let cutoff = NaiveTime::from_hms_opt(15, 15, 0).unwrap();
        // 09:45 UTC is exactly 15:15 IST
        let at_cutoff = Utc.with_ymd_and_hms(2025, 1, 6, 9, 45, 0).unwrap();
        assert!(past_cutoff(at_cutoff, 330, cutoff));

        let before = Utc.with_ymd_and_hms(2025, 1, 6, 9, 44, 59).unwrap();
        assert!(!past_cutoff(before, 330, cutoff));

        let after = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        assert!(past_cutoff(after, 330, cutoff));
    }

    #[test]
    fn test_past_cutoff_out_of_range_offset() {
        let cutoff = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        // Overflows the seconds conversion entirely
        assert!(!past_cutoff(now, i32::MAX, cutoff));
        assert!(!past_cutoff(now, i32::MIN, cutoff));
        // Converts cleanly but exceeds the valid offset range
        assert!(!past_cutoff(now, 1441, cutoff));
    }

    #[tokio::test]
    async fn test_hard_sl_reason() {
        let f = fixture().await;
        f.store.upsert(tracker(1)).await.unwrap();
        f.cache.add(&tracker(1), None, None).unwrap();
        f.cache.update_ltp(
            &InstrumentKey::new("NSE_FNO", "45510"),
            dec!(103.5),
            Utc::now(),
        );

        let summary = f.sweeper(no_cutoff()).sweep_once().await;
        assert_eq!(
            summary,
            SweepSummary {
                checked: 1,
                exits_requested: 1,
                skipped: 0
            }
        );
        assert_eq!(f.executor.calls(), vec![(1, "SL HIT -31%".to_string())]);
    }

    #[tokio::test]
    async fn test_take_profit_reason() {
        let f = fixture().await;
        f.store.upsert(tracker(1)).await.unwrap();
        f.cache.add(&tracker(1), None, None).unwrap();
        f.cache.update_ltp(
            &InstrumentKey::new("NSE_FNO", "45510"),
            dec!(225),
            Utc::now(),
        );

        f.sweeper(no_cutoff()).sweep_once().await;
        assert_eq!(f.executor.calls(), vec![(1, "TP HIT 50%".to_string())]);
    }

    #[tokio::test]
    async fn test_sl_beats_time_cutoff() {
        let f = fixture().await;
        f.store.upsert(tracker(1)).await.unwrap();
        f.cache.add(&tracker(1), None, None).unwrap();
        f.cache.update_ltp(
            &InstrumentKey::new("NSE_FNO", "45510"),
            dec!(100),
            Utc::now(),
        );

        let summary = f.sweeper(cutoff_always()).sweep_once().await;
        // One exit request only, with the stop-loss reason
        assert_eq!(summary.exits_requested, 1);
        let calls = f.executor.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.starts_with("SL HIT"));
    }

    #[tokio::test]
    async fn test_time_exit_for_healthy_position() {
        let f = fixture().await;
        f.store.upsert(tracker(1)).await.unwrap();
        f.cache.add(&tracker(1), None, None).unwrap();
        f.cache.update_ltp(
            &InstrumentKey::new("NSE_FNO", "45510"),
            dec!(151),
            Utc::now(),
        );

        f.sweeper(cutoff_always()).sweep_once().await;
        assert_eq!(f.executor.calls(), vec![(1, "time_exit".to_string())]);
    }

    #[tokio::test]
    async fn test_unpriced_position_skipped() {
        let f = fixture().await;
        f.store.upsert(tracker(1)).await.unwrap();
        f.cache.add(&tracker(1), None, None).unwrap();

        let summary = f.sweeper(cutoff_always()).sweep_once().await;
        assert_eq!(
            summary,
            SweepSummary {
                checked: 1,
                exits_requested: 0,
                skipped: 1
            }
        );
        assert!(f.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_skip_does_not_abort_pass() {
        let f = fixture().await;
        let mut other = tracker(2);
        other.security_id = "99999".to_string();
        f.store.upsert(tracker(1)).await.unwrap();
        f.store.upsert(other.clone()).await.unwrap();
        f.cache.add(&tracker(1), None, None).unwrap();
        f.cache.add(&other, None, None).unwrap();
        // Only tracker 2 has a price, deep under the hard stop
        f.cache.update_ltp(
            &InstrumentKey::new("NSE_FNO", "99999"),
            dec!(90),
            Utc::now(),
        );

        let summary = f.sweeper(no_cutoff()).sweep_once().await;
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.exits_requested, 1);
        assert_eq!(f.executor.calls(), vec![(2, "SL HIT -40%".to_string())]);
    }

    #[tokio::test]
    async fn test_inactive_tracker_silent_skip() {
        let f = fixture().await;
        let mut exited = tracker(1);
        exited.status = TrackerStatus::Exited;
        f.store.upsert(exited).await.unwrap();
        // Cache still holds the snapshot; the coordinator's re-check stops it
        f.cache.add(&tracker(1), None, None).unwrap();
        f.cache.update_ltp(
            &InstrumentKey::new("NSE_FNO", "45510"),
            dec!(100),
            Utc::now(),
        );

        let summary = f.sweeper(no_cutoff()).sweep_once().await;
        assert_eq!(summary.exits_requested, 1);
        assert!(f.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let f = fixture().await;
        f.store.upsert(tracker(1)).await.unwrap();
        f.cache.add(&tracker(1), None, None).unwrap();
        f.cache.update_ltp(
            &InstrumentKey::new("NSE_FNO", "45510"),
            dec!(100),
            Utc::now(),
        );

        let sweeper = Arc::new(f.sweeper(no_cutoff()));
        let handle = sweeper.start();
        // First interval tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        assert_eq!(f.executor.calls().len(), 1);
    }
}
