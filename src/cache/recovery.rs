//! Crash recovery
//!
//! On startup the cache is rebuilt from the active tracker list and the
//! durable peak store is folded back in, so the peak-drawdown rule keeps
//! its reference point across restarts.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::snapshot::{PositionSnapshot, SnapshotPatch};
use super::store::PositionCache;
use crate::peaks::PeakStore;
use crate::tracker::{TrackerId, TrackerStore};

/// Outcome of matching stored peaks against live snapshots
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PeakReconciliation {
    /// Stored peaks that advance an existing snapshot
    pub merged: Vec<(TrackerId, Decimal)>,
    /// Stored peaks whose tracker is not in the cache yet
    pub pending: Vec<(TrackerId, Decimal)>,
}

/// Match stored peaks against snapshots, monotone merges only
///
/// A stored peak must be positive and strictly above the snapshot's
/// current value to merge; peaks for unknown trackers are reported as
/// pending so the cache can apply them when the tracker shows up.
pub fn reconcile_peaks(
    snapshots: &[PositionSnapshot],
    stored_peaks: &[(TrackerId, Decimal)],
) -> PeakReconciliation {
    let by_tracker: HashMap<TrackerId, &PositionSnapshot> =
        snapshots.iter().map(|s| (s.tracker_id, s)).collect();

    let mut recon = PeakReconciliation::default();
    for (id, peak) in stored_peaks {
        if *peak <= Decimal::ZERO {
            continue;
        }
        match by_tracker.get(id) {
            Some(snapshot) => {
                if *peak > snapshot.peak_profit_pct {
                    recon.merged.push((*id, *peak));
                }
            }
            None => recon.pending.push((*id, *peak)),
        }
    }
    recon
}

/// Rebuild the cache from the tracker store and reconcile durable peaks
///
/// Returns the number of positions restored. A peak store read failure is
/// logged for that tracker and skipped; it never aborts recovery.
pub async fn recover(
    cache: &PositionCache,
    trackers: &dyn TrackerStore,
    peaks: &dyn PeakStore,
) -> anyhow::Result<usize> {
    let active = trackers.active().await?;
    let added = cache.bulk_load(&active);

    let mut stored = Vec::new();
    for tracker in &active {
        match peaks.get(tracker.id).await {
            Ok(Some(peak)) => stored.push((tracker.id, peak)),
            Ok(None) => {}
            Err(e) => {
                warn!(tracker_id = tracker.id, error = %e, "Peak lookup failed during recovery");
            }
        }
    }

    let recon = reconcile_peaks(&cache.all(), &stored);
    for (id, peak) in &recon.merged {
        cache.apply(
            *id,
            SnapshotPatch {
                peak_profit_pct: Some(*peak),
                ..Default::default()
            },
        );
    }
    for (id, peak) in &recon.pending {
        cache.park_pending_peak(*id, *peak);
    }

    info!(
        restored = added,
        peaks_merged = recon.merged.len(),
        peaks_pending = recon.pending.len(),
        "Recovery complete"
    );
    Ok(added)
}
