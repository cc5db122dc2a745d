//! Paper exit executor
//!
//! Closes positions against the tracker store instead of a broker. The
//! status transition is the idempotency point: whoever wins the
//! compare-and-set owns the cleanup, everyone else gets the no-op.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::{ExitError, ExitExecutor, ExitOutcome};
use crate::cache::PositionCache;
use crate::peaks::PeakStore;
use crate::tracker::{Tracker, TrackerStatus, TrackerStore, TrackerUpdate};

/// Exit executor for paper trading and tests
pub struct PaperExitExecutor {
    store: Arc<dyn TrackerStore>,
    cache: Arc<PositionCache>,
    peaks: Arc<dyn PeakStore>,
}

impl PaperExitExecutor {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        cache: Arc<PositionCache>,
        peaks: Arc<dyn PeakStore>,
    ) -> Self {
        Self {
            store,
            cache,
            peaks,
        }
    }
}

#[async_trait]
impl ExitExecutor for PaperExitExecutor {
    async fn execute_exit(&self, tracker: &Tracker, reason: &str) -> Result<ExitOutcome, ExitError> {
        // Fill at the last seen price; None when no tick ever arrived
        let exit_price = self
            .cache
            .get_by_tracker(tracker.id)
            .and_then(|s| s.current_ltp);

        let update = TrackerUpdate {
            exit_reason: Some(reason.to_string()),
            exit_price,
            exited_at: Some(Utc::now()),
            ..Default::default()
        };
        let moved = self
            .store
            .try_transition(tracker.id, TrackerStatus::Active, TrackerStatus::Exited, update)
            .await?;
        if !moved {
            return Ok(ExitOutcome::already_exited());
        }

        self.cache.on_tracker_closed(tracker.id);
        if let Err(e) = self.peaks.clear(tracker.id).await {
            // Exit already committed; a stale peak entry just ages out via TTL
            warn!(tracker_id = tracker.id, error = %e, "Failed to clear peak entry");
        }

        let detail = match exit_price {
            Some(price) => format!("paper exit at {price}"),
            None => "paper exit without fill price".to_string(),
        };
        info!(tracker_id = tracker.id, reason, detail = %detail, "Paper exit filled");
        Ok(ExitOutcome::success(detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InstrumentKey;
    use crate::peaks::MemoryPeakStore;
    use crate::tracker::JsonTrackerStore;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tempfile::tempdir;

    fn active_tracker(id: i64) -> Tracker {
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

    struct Fixture {
        store: Arc<JsonTrackerStore>,
        cache: Arc<PositionCache>,
        peaks: Arc<MemoryPeakStore>,
        executor: PaperExitExecutor,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonTrackerStore::open(dir.path().join("trackers.json")).unwrap());
        let cache = Arc::new(PositionCache::new());
        let peaks = Arc::new(MemoryPeakStore::new());
        let executor = PaperExitExecutor::new(store.clone(), cache.clone(), peaks.clone());
        Fixture {
            store,
            cache,
            peaks,
            executor,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_exit_transitions_and_cleans_up() {
        let f = fixture().await;
        let tracker = active_tracker(1);
        f.store.upsert(tracker.clone()).await.unwrap();
        f.cache.add(&tracker, None, None).unwrap();
        f.cache.update_ltp(
            &InstrumentKey::new("NSE_FNO", "45510"),
            dec!(165),
            Utc::now(),
        );
        f.peaks
            .set(1, dec!(10), Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = f
            .executor
            .execute_exit(&tracker, "trailing_stop_exit")
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.detail.contains("165"));

        let stored = f.store.get(1).await.unwrap().unwrap();
        assert_eq!(stored.status, TrackerStatus::Exited);
        assert_eq!(stored.exit_reason.as_deref(), Some("trailing_stop_exit"));
        assert_eq!(stored.exit_price, Some(dec!(165)));
        assert!(stored.exited_at.is_some());

        assert!(f.cache.get_by_tracker(1).is_none());
        assert_eq!(f.peaks.get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_exit_idempotent_on_terminal_tracker() {
        let f = fixture().await;
        let tracker = active_tracker(1);
        f.store.upsert(tracker.clone()).await.unwrap();
        f.cache.add(&tracker, None, None).unwrap();

        f.executor.execute_exit(&tracker, "time_exit").await.unwrap();
        let second = f.executor.execute_exit(&tracker, "time_exit").await.unwrap();

        assert!(second.success);
        assert_eq!(second.detail, "already exited");
        // First reason wins
        let stored = f.store.get(1).await.unwrap().unwrap();
        assert_eq!(stored.exit_reason.as_deref(), Some("time_exit"));
    }

    #[tokio::test]
    async fn test_exit_without_ticks_has_no_fill_price() {
        let f = fixture().await;
        let tracker = active_tracker(2);
        f.store.upsert(tracker.clone()).await.unwrap();
        f.cache.add(&tracker, None, None).unwrap();

        let outcome = f
            .executor
            .execute_exit(&tracker, "SL HIT -31.2%")
            .await
            .unwrap();
        assert!(outcome.success);

        let stored = f.store.get(2).await.unwrap().unwrap();
        assert_eq!(stored.exit_price, None);
    }
}
