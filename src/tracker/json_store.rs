//! File-backed tracker store
//!
//! Serializes the whole tracker map to a JSON file after each mutation.
//! Suitable for paper trading and tests; a broker-backed store implements
//! the same trait against its own persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Tracker, TrackerId, TrackerStatus, TrackerStore, TrackerUpdate};

/// Tracker store persisted as a single JSON document
pub struct JsonTrackerStore {
    path: PathBuf,
    trackers: Mutex<BTreeMap<TrackerId, Tracker>>,
}

impl JsonTrackerStore {
    /// Open a store at `path`, loading existing trackers if the file exists
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let trackers = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read tracker store {}", path.display()))?;
            let list: Vec<Tracker> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse tracker store {}", path.display()))?;
            debug!(count = list.len(), path = %path.display(), "Loaded tracker store");
            list.into_iter().map(|t| (t.id, t)).collect()
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            trackers: Mutex::new(trackers),
        })
    }

    /// Insert or replace a tracker and persist
    ///
    /// Entry placement lives outside this core; this is the hook the outer
    /// system (and tests) use to seed trackers.
    pub async fn upsert(&self, tracker: Tracker) -> anyhow::Result<()> {
        let mut trackers = self.trackers.lock().await;
        trackers.insert(tracker.id, tracker);
        self.flush(&trackers)
    }

    fn apply(tracker: &mut Tracker, update: TrackerUpdate) {
        if let Some(hwm) = update.high_water_mark_pnl {
            tracker.high_water_mark_pnl = hwm;
        }
        if let Some(locked) = update.breakeven_locked {
            tracker.breakeven_locked = locked;
        }
        if let Some(stop) = update.trailing_stop_price {
            tracker.trailing_stop_price = Some(stop);
        }
        if let Some(reason) = update.exit_reason {
            tracker.exit_reason = Some(reason);
        }
        if let Some(price) = update.exit_price {
            tracker.exit_price = Some(price);
        }
        if let Some(at) = update.exited_at {
            tracker.exited_at = Some(at);
        }
    }

    fn flush(&self, trackers: &BTreeMap<TrackerId, Tracker>) -> anyhow::Result<()> {
        let list: Vec<&Tracker> = trackers.values().collect();
        let raw = serde_json::to_string_pretty(&list).context("Failed to serialize trackers")?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create tracker store dir {}", parent.display())
                })?;
            }
        }
        std::fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write tracker store {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl TrackerStore for JsonTrackerStore {
    async fn active(&self) -> anyhow::Result<Vec<Tracker>> {
        let trackers = self.trackers.lock().await;
        Ok(trackers
            .values()
            .filter(|t| t.is_active())
            .cloned()
            .collect())
    }

    async fn get(&self, id: TrackerId) -> anyhow::Result<Option<Tracker>> {
        let trackers = self.trackers.lock().await;
        Ok(trackers.get(&id).cloned())
    }

    async fn update(&self, id: TrackerId, update: TrackerUpdate) -> anyhow::Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let mut trackers = self.trackers.lock().await;
        let tracker = trackers
            .get_mut(&id)
            .with_context(|| format!("Unknown tracker {id}"))?;
        Self::apply(tracker, update);
        self.flush(&trackers)
    }

    async fn try_transition(
        &self,
        id: TrackerId,
        from: TrackerStatus,
        to: TrackerStatus,
        update: TrackerUpdate,
    ) -> anyhow::Result<bool> {
        let mut trackers = self.trackers.lock().await;
        let Some(tracker) = trackers.get_mut(&id) else {
            warn!(tracker_id = id, "Transition requested for unknown tracker");
            return Ok(false);
        };
        if tracker.status != from {
            debug!(
                tracker_id = id,
                status = %tracker.status,
                expected = %from,
                "Transition skipped, status moved"
            );
            return Ok(false);
        }
        tracker.status = to;
        Self::apply(tracker, update);
        self.flush(&trackers)?;
        Ok(true)
    }
}
