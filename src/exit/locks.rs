//! Per-tracker exit locks

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::tracker::TrackerId;

/// Try-acquire registry of in-flight exits, one slot per tracker
///
/// The only mutual exclusion in the crate. A holder keeps the slot for the
/// life of the returned guard; everyone else gets None and walks away.
/// Held only around the decide-to-exit plus executor call, never around
/// cache reads.
#[derive(Clone, Default)]
pub struct ExitLocks {
    in_flight: Arc<DashMap<TrackerId, ()>>,
}

impl ExitLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the exit slot for a tracker
    ///
    /// Returns None when another path already holds it. The claim is
    /// atomic under the map's shard lock.
    pub fn begin(&self, tracker_id: TrackerId) -> Option<ExitGuard> {
        match self.in_flight.entry(tracker_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(ExitGuard {
                    tracker_id,
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }

    /// Whether an exit is currently in flight for a tracker
    pub fn is_held(&self, tracker_id: TrackerId) -> bool {
        self.in_flight.contains_key(&tracker_id)
    }
}

/// Releases the exit slot on drop
pub struct ExitGuard {
    tracker_id: TrackerId,
    in_flight: Arc<DashMap<TrackerId, ()>>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.tracker_id);
    }
}
