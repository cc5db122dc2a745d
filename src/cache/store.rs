//! Concurrent position cache

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::snapshot::{InstrumentKey, PositionSnapshot, SnapshotPatch};
use super::types::CacheError;
use crate::peaks::PeakStore;
use crate::tracker::{Tracker, TrackerId, TrackerStore, TrackerUpdate};

const DEFAULT_PEAK_TTL: Duration = Duration::from_secs(86_400);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Shared cache of open position snapshots
///
/// Keyed by instrument with a tracker-id index alongside. All maps are
/// sharded, so operations on different positions never contend; a tick for
/// one instrument and a sweep read of another proceed fully in parallel.
pub struct PositionCache {
    positions: DashMap<InstrumentKey, PositionSnapshot>,
    tracker_index: DashMap<TrackerId, InstrumentKey>,
    /// Last observed price per instrument, kept even without a snapshot so
    /// a position added mid-stream starts with a price
    last_prices: DashMap<InstrumentKey, Decimal>,
    /// Recovered peaks waiting for their tracker to be added
    pending_peaks: DashMap<TrackerId, Decimal>,
    peaks: Option<Arc<dyn PeakStore>>,
    peak_ttl: Duration,
    peak_write_timeout: Duration,
    /// Durable record of tightening state, written through on change
    trackers: Option<Arc<dyn TrackerStore>>,
    tracker_write_timeout: Duration,
}

impl Default for PositionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionCache {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
            tracker_index: DashMap::new(),
            last_prices: DashMap::new(),
            pending_peaks: DashMap::new(),
            peaks: None,
            peak_ttl: DEFAULT_PEAK_TTL,
            peak_write_timeout: DEFAULT_WRITE_TIMEOUT,
            trackers: None,
            tracker_write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Attach a durable peak store
    ///
    /// Peak advances are then written through as spawned fire-and-forget
    /// tasks bounded by `write_timeout`, so attaching a store requires a
    /// running tokio runtime on the tick path.
    pub fn with_peak_store(
        mut self,
        store: Arc<dyn PeakStore>,
        ttl: Duration,
        write_timeout: Duration,
    ) -> Self {
        self.peaks = Some(store);
        self.peak_ttl = ttl;
        self.peak_write_timeout = write_timeout;
        self
    }

    /// Attach the tracker store for tightening write-through
    ///
    /// High water mark advances, breakeven locks and trailing stop moves
    /// are then persisted as spawned fire-and-forget tasks bounded by
    /// `write_timeout`, so the state a restart rebuilds from keeps up with
    /// the cache. Requires a running tokio runtime on the tick path.
    pub fn with_tracker_store(
        mut self,
        store: Arc<dyn TrackerStore>,
        write_timeout: Duration,
    ) -> Self {
        self.trackers = Some(store);
        self.tracker_write_timeout = write_timeout;
        self
    }

    /// Snapshot count
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Add an active tracker's position to the cache
    ///
    /// Seeds persisted fields from the tracker, resolves the last known
    /// price for the instrument if one was observed, and applies any
    /// recovered peak parked for this tracker id.
    pub fn add(
        &self,
        tracker: &Tracker,
        sl_price: Option<Decimal>,
        tp_price: Option<Decimal>,
    ) -> Result<PositionSnapshot, CacheError> {
        if !tracker.is_active() {
            return Err(CacheError::TrackerNotActive(tracker.id, tracker.status));
        }
        if tracker.entry_price <= Decimal::ZERO {
            return Err(CacheError::InvalidEntryPrice(
                tracker.id,
                tracker.entry_price,
            ));
        }
        if tracker.quantity == 0 {
            return Err(CacheError::ZeroQuantity(tracker.id));
        }

        let key = InstrumentKey::for_tracker(tracker);
        let mut snapshot = PositionSnapshot::from_tracker(tracker, sl_price, tp_price);

        if let Some(ltp) = self.last_prices.get(&key).map(|p| *p) {
            snapshot.apply_ltp(ltp, Utc::now());
        }
        if let Some((_, peak)) = self.pending_peaks.remove(&tracker.id) {
            if snapshot.merge_peak(peak) {
                debug!(
                    tracker_id = tracker.id,
                    peak = %peak,
                    "Applied pending recovered peak"
                );
            }
        }

        self.tracker_index.insert(tracker.id, key.clone());
        self.positions.insert(key, snapshot.clone());
        Ok(snapshot)
    }

    /// Remove a position by tracker id, idempotent
    pub fn remove(&self, tracker_id: TrackerId) -> bool {
        self.pending_peaks.remove(&tracker_id);
        match self.tracker_index.remove(&tracker_id) {
            Some((_, key)) => self.positions.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn get(&self, key: &InstrumentKey) -> Option<PositionSnapshot> {
        self.positions.get(key).map(|s| s.clone())
    }

    pub fn get_by_tracker(&self, tracker_id: TrackerId) -> Option<PositionSnapshot> {
        let key = self.tracker_index.get(&tracker_id)?.clone();
        self.get(&key)
    }

    /// Owned clones of every snapshot
    pub fn all(&self) -> Vec<PositionSnapshot> {
        self.positions.iter().map(|s| s.clone()).collect()
    }

    /// Apply a traded price to the position on `key`
    ///
    /// The price is recorded for the instrument even when no snapshot
    /// exists yet. Returns the updated snapshot, or None for an unknown
    /// key or a non-positive price. Raises the high water mark and peak,
    /// never lowers them; advances are written through to the attached
    /// stores without blocking the caller.
    pub fn update_ltp(
        &self,
        key: &InstrumentKey,
        ltp: Decimal,
        at: DateTime<Utc>,
    ) -> Option<PositionSnapshot> {
        if ltp <= Decimal::ZERO {
            warn!(instrument = %key, ltp = %ltp, "Ignoring non-positive price");
            return None;
        }
        self.last_prices.insert(key.clone(), ltp);

        let mut entry = self.positions.get_mut(key)?;
        let hwm_before = entry.high_water_mark;
        let peak_advanced = entry.apply_ltp(ltp, at);
        let snapshot = entry.clone();
        drop(entry);

        if peak_advanced {
            self.persist_peak(snapshot.tracker_id, snapshot.peak_profit_pct);
        }
        if snapshot.high_water_mark > hwm_before {
            self.persist_tightening(
                snapshot.tracker_id,
                TrackerUpdate {
                    high_water_mark_pnl: Some(snapshot.high_water_mark),
                    ..Default::default()
                },
            );
        }
        Some(snapshot)
    }

    /// Apply a validated partial update to the snapshot of `tracker_id`
    ///
    /// Returns false when the tracker has no snapshot. The peak field only
    /// merges upward and the breakeven flag never clears. An upward peak
    /// merge is written through to the peak store; a breakeven lock or
    /// trailing stop move is written through to the tracker store.
    pub fn apply(&self, tracker_id: TrackerId, patch: SnapshotPatch) -> bool {
        if patch.is_empty() {
            return self.tracker_index.contains_key(&tracker_id);
        }
        let Some(key) = self.tracker_index.get(&tracker_id).map(|k| k.clone()) else {
            return false;
        };
        let Some(mut entry) = self.positions.get_mut(&key) else {
            return false;
        };

        let mut tightened = TrackerUpdate::default();
        if let Some(sl) = patch.sl_price {
            entry.sl_price = Some(sl);
        }
        if let Some(stop) = patch.trailing_stop_price {
            if entry.trailing_stop_price != Some(stop) {
                tightened.trailing_stop_price = Some(stop);
            }
            entry.trailing_stop_price = Some(stop);
        }
        if patch.breakeven_locked == Some(true) && !entry.breakeven_locked {
            entry.breakeven_locked = true;
            tightened.breakeven_locked = Some(true);
        }
        let mut advanced_peak = None;
        if let Some(peak) = patch.peak_profit_pct {
            if entry.merge_peak(peak) {
                advanced_peak = Some(entry.peak_profit_pct);
            }
        }
        drop(entry);

        if let Some(peak) = advanced_peak {
            self.persist_peak(tracker_id, peak);
        }
        if !tightened.is_empty() {
            self.persist_tightening(tracker_id, tightened);
        }
        true
    }

    /// Rebuild the cache from the active tracker list, in id order
    ///
    /// Returns the number of positions added. Invalid trackers are logged
    /// and skipped. Peak reconciliation runs separately after the load.
    pub fn bulk_load(&self, trackers: &[Tracker]) -> usize {
        let mut ordered: Vec<&Tracker> = trackers.iter().collect();
        ordered.sort_by_key(|t| t.id);

        let mut added = 0;
        for tracker in ordered {
            match self.add(tracker, None, None) {
                Ok(_) => added += 1,
                Err(e) => {
                    warn!(tracker_id = tracker.id, error = %e, "Skipping tracker on load");
                }
            }
        }
        info!(added, total = trackers.len(), "Rebuilt position cache");
        added
    }

    /// Park a recovered peak for a tracker not yet in the cache
    ///
    /// Applied automatically the moment that tracker is added.
    pub fn park_pending_peak(&self, tracker_id: TrackerId, peak_pct: Decimal) {
        if peak_pct > Decimal::ZERO {
            self.pending_peaks.insert(tracker_id, peak_pct);
        }
    }

    /// Membership hook: a tracker just became active
    pub fn on_tracker_activated(
        &self,
        tracker: &Tracker,
        sl_price: Option<Decimal>,
        tp_price: Option<Decimal>,
    ) -> Result<PositionSnapshot, CacheError> {
        let snapshot = self.add(tracker, sl_price, tp_price)?;
        info!(
            tracker_id = tracker.id,
            instrument = %snapshot.key(),
            entry = %snapshot.entry_price,
            qty = snapshot.quantity,
            "Position opened"
        );
        Ok(snapshot)
    }

    /// Membership hook: a tracker reached a terminal status
    pub fn on_tracker_closed(&self, tracker_id: TrackerId) -> bool {
        let removed = self.remove(tracker_id);
        if removed {
            info!(tracker_id, "Position removed from cache");
        }
        removed
    }

    /// Fire-and-forget durable peak write, bounded by the write timeout
    fn persist_peak(&self, tracker_id: TrackerId, peak_pct: Decimal) {
        let Some(store) = self.peaks.clone() else {
            return;
        };
        let ttl = self.peak_ttl;
        let timeout = self.peak_write_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.set(tracker_id, peak_pct, ttl)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(tracker_id, error = %e, "Peak write failed");
                }
                Err(_) => {
                    warn!(tracker_id, timeout_ms = timeout.as_millis() as u64, "Peak write timed out");
                }
            }
        });
    }

    /// Fire-and-forget durable tightening write, bounded by the write timeout
    fn persist_tightening(&self, tracker_id: TrackerId, update: TrackerUpdate) {
        let Some(store) = self.trackers.clone() else {
            return;
        };
        let timeout = self.tracker_write_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.update(tracker_id, update)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(tracker_id, error = %e, "Tightening write failed");
                }
                Err(_) => {
                    warn!(tracker_id, timeout_ms = timeout.as_millis() as u64, "Tightening write timed out");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peaks::MemoryPeakStore;
    use crate::tracker::{JsonTrackerStore, TrackerStatus};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn tracker(id: TrackerId, security_id: &str) -> Tracker {
        Tracker {
            id,
            security_id: security_id.to_string(),
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

    fn key() -> InstrumentKey {
        InstrumentKey::new("NSE_FNO", "45510")
    }

    #[test]
    fn test_add_rejects_invalid_trackers() {
        let cache = PositionCache::new();

        let mut pending = tracker(1, "45510");
        pending.status = TrackerStatus::Pending;
        assert!(matches!(
            cache.add(&pending, None, None),
            Err(CacheError::TrackerNotActive(1, TrackerStatus::Pending))
        ));

        let mut bad_price = tracker(2, "45510");
        bad_price.entry_price = dec!(0);
        assert!(matches!(
            cache.add(&bad_price, None, None),
            Err(CacheError::InvalidEntryPrice(2, _))
        ));

        let mut flat = tracker(3, "45510");
        flat.quantity = 0;
        assert!(matches!(
            cache.add(&flat, None, None),
            Err(CacheError::ZeroQuantity(3))
        ));

        assert!(cache.is_empty());
    }

    #[test]
    fn test_add_resolves_last_known_price() {
        let cache = PositionCache::new();
        // Tick observed before the position exists
        assert!(cache.update_ltp(&key(), dec!(157.5), Utc::now()).is_none());

        let snapshot = cache.add(&tracker(1, "45510"), None, None).unwrap();
        assert_eq!(snapshot.current_ltp, Some(dec!(157.5)));
        assert_eq!(snapshot.pnl, dec!(562.5));
        assert_eq!(snapshot.pnl_pct, dec!(5));
    }

    #[test]
    fn test_remove_idempotent() {
        let cache = PositionCache::new();
        cache.add(&tracker(1, "45510"), None, None).unwrap();

        assert!(cache.remove(1));
        assert!(!cache.remove(1));
        assert!(cache.get_by_tracker(1).is_none());
    }

    #[test]
    fn test_lifecycle_hooks() {
        let cache = PositionCache::new();
        cache.park_pending_peak(1, dec!(12.5));

        let snapshot = cache
            .on_tracker_activated(&tracker(1, "45510"), Some(dec!(127.5)), Some(dec!(225)))
            .unwrap();
        assert_eq!(snapshot.sl_price, Some(dec!(127.5)));
        assert_eq!(snapshot.tp_price, Some(dec!(225)));
        // The parked peak is consumed on activation
        assert_eq!(snapshot.peak_profit_pct, dec!(12.5));

        assert!(cache.on_tracker_closed(1));
        assert!(!cache.on_tracker_closed(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_update_ltp_unknown_key_and_bad_price() {
        let cache = PositionCache::new();
        assert!(cache.update_ltp(&key(), dec!(100), Utc::now()).is_none());

        cache.add(&tracker(1, "45510"), None, None).unwrap();
        assert!(cache.update_ltp(&key(), dec!(0), Utc::now()).is_none());
        assert!(cache.update_ltp(&key(), dec!(-5), Utc::now()).is_none());
        // Bad prices leave the snapshot untouched
        let snapshot = cache.get_by_tracker(1).unwrap();
        assert_eq!(snapshot.current_ltp, Some(dec!(100)));
        assert_eq!(snapshot.pnl, dec!(-3750));
    }

    #[test]
    fn test_maxima_monotone_over_sequence() {
        let cache = PositionCache::new();
        cache.add(&tracker(1, "45510"), None, None).unwrap();

        let prices = [
            dec!(157.5),
            dec!(150),
            dec!(187.5),
            dec!(120),
            dec!(165),
            dec!(187),
        ];
        let mut max_peak = dec!(0);
        let mut max_hwm = dec!(0);
        for price in prices {
            let snapshot = cache.update_ltp(&key(), price, Utc::now()).unwrap();
            assert!(snapshot.peak_profit_pct >= max_peak);
            assert!(snapshot.high_water_mark >= max_hwm);
            max_peak = snapshot.peak_profit_pct;
            max_hwm = snapshot.high_water_mark;
        }
        assert_eq!(max_peak, dec!(25));
        assert_eq!(max_hwm, dec!(2812.5));
    }

    #[test]
    fn test_apply_patch_round_trip() {
        let cache = PositionCache::new();
        cache.add(&tracker(1, "45510"), None, None).unwrap();

        let applied = cache.apply(
            1,
            SnapshotPatch {
                sl_price: Some(dec!(127.5)),
                trailing_stop_price: Some(dec!(130)),
                breakeven_locked: Some(true),
                peak_profit_pct: Some(dec!(12.5)),
            },
        );
        assert!(applied);

        let snapshot = cache.get_by_tracker(1).unwrap();
        assert_eq!(snapshot.sl_price, Some(dec!(127.5)));
        assert_eq!(snapshot.trailing_stop_price, Some(dec!(130)));
        assert!(snapshot.breakeven_locked);
        assert_eq!(snapshot.peak_profit_pct, dec!(12.5));
        // Unspecified fields untouched
        assert_eq!(snapshot.tp_price, None);
        assert_eq!(snapshot.current_ltp, None);
    }

    #[test]
    fn test_apply_enforces_monotonicity() {
        let cache = PositionCache::new();
        cache.add(&tracker(1, "45510"), None, None).unwrap();
        cache.apply(
            1,
            SnapshotPatch {
                breakeven_locked: Some(true),
                peak_profit_pct: Some(dec!(20)),
                ..Default::default()
            },
        );

        cache.apply(
            1,
            SnapshotPatch {
                breakeven_locked: Some(false),
                peak_profit_pct: Some(dec!(5)),
                ..Default::default()
            },
        );

        let snapshot = cache.get_by_tracker(1).unwrap();
        assert!(snapshot.breakeven_locked);
        assert_eq!(snapshot.peak_profit_pct, dec!(20));
    }

    #[test]
    fn test_apply_unknown_tracker() {
        let cache = PositionCache::new();
        assert!(!cache.apply(
            99,
            SnapshotPatch {
                sl_price: Some(dec!(100)),
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_pending_peak_applied_on_add() {
        let cache = PositionCache::new();
        cache.park_pending_peak(42, dec!(25.5));

        let snapshot = cache.add(&tracker(42, "45510"), None, None).unwrap();
        assert_eq!(snapshot.peak_profit_pct, dec!(25.5));
        // Consumed once
        cache.remove(42);
        let again = cache.add(&tracker(42, "45510"), None, None).unwrap();
        assert_eq!(again.peak_profit_pct, dec!(0));
    }

    #[test]
    fn test_bulk_load_orders_and_skips() {
        let cache = PositionCache::new();
        let mut bad = tracker(2, "11111");
        bad.entry_price = dec!(-1);
        let trackers = vec![tracker(3, "33333"), bad, tracker(1, "45510")];

        let added = cache.bulk_load(&trackers);
        assert_eq!(added, 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_by_tracker(1).is_some());
        assert!(cache.get_by_tracker(2).is_none());
        assert!(cache.get_by_tracker(3).is_some());
    }

    #[tokio::test]
    async fn test_peak_advance_written_through() {
        let store = Arc::new(MemoryPeakStore::new());
        let cache = PositionCache::new().with_peak_store(
            store.clone(),
            Duration::from_secs(60),
            Duration::from_millis(250),
        );
        cache.add(&tracker(1, "45510"), None, None).unwrap();

        cache.update_ltp(&key(), dec!(187.5), Utc::now()).unwrap();
        // The write is spawned; give it a beat
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get(1).await.unwrap(), Some(dec!(25)));
    }

    #[tokio::test]
    async fn test_tightening_written_through() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonTrackerStore::open(dir.path().join("t.json")).unwrap());
        store.upsert(tracker(1, "45510")).await.unwrap();
        let cache =
            PositionCache::new().with_tracker_store(store.clone(), Duration::from_millis(250));
        cache.add(&tracker(1, "45510"), None, None).unwrap();

        // A new high raises the persisted high water mark
        cache.update_ltp(&key(), dec!(187.5), Utc::now()).unwrap();
        // An evaluator-style tightening patch persists the lock and stop
        cache.apply(
            1,
            SnapshotPatch {
                sl_price: Some(dec!(165)),
                trailing_stop_price: Some(dec!(165)),
                breakeven_locked: Some(true),
                ..Default::default()
            },
        );
        // The writes are spawned; give them a beat
        tokio::time::sleep(Duration::from_millis(50)).await;

        let persisted = store.get(1).await.unwrap().unwrap();
        assert_eq!(persisted.high_water_mark_pnl, dec!(2812.5));
        assert!(persisted.breakeven_locked);
        assert_eq!(persisted.trailing_stop_price, Some(dec!(165)));
    }

    #[tokio::test]
    async fn test_concurrent_ticks_distinct_positions() {
        let cache = Arc::new(PositionCache::new());
        cache.add(&tracker(1, "45510"), None, None).unwrap();
        cache.add(&tracker(2, "45511"), None, None).unwrap();

        let mut handles = Vec::new();
        for (security_id, price) in [("45510", dec!(165)), ("45511", dec!(172.5))] {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = InstrumentKey::new("NSE_FNO", security_id);
                for _ in 0..100 {
                    cache.update_ltp(&key, price, Utc::now());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.get_by_tracker(1).unwrap().pnl_pct, dec!(10));
        assert_eq!(cache.get_by_tracker(2).unwrap().pnl_pct, dec!(15));
    }
}
