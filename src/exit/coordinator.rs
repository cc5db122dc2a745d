//! Exit coordination
//!
//! Single routine shared by the tick path and the sweep. Serializes exit
//! attempts per tracker and re-checks liveness under the lock, which is
//! what turns two concurrent exit decisions into exactly one executor call.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::locks::ExitLocks;
use super::{ExitExecutor, ExitOutcome};
use crate::telemetry::{increment, CounterMetric};
use crate::tracker::{TrackerId, TrackerStore};

/// How an exit request resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitResolution {
    /// Executor ran and reported success
    Executed(String),
    /// Another path holds the tracker's exit slot
    AlreadyInFlight,
    /// Tracker missing or no longer active when re-checked
    Inactive,
    /// Executor failed or timed out; tracker stays active for retry
    Failed(String),
}

impl ExitResolution {
    /// Whether the position is confirmed closed
    pub fn is_executed(&self) -> bool {
        matches!(self, ExitResolution::Executed(_))
    }
}

/// Shared exit entry point for every rule that decides to close a position
pub struct ExitCoordinator {
    executor: Arc<dyn ExitExecutor>,
    store: Arc<dyn TrackerStore>,
    locks: ExitLocks,
    call_timeout: Duration,
}

impl ExitCoordinator {
    pub fn new(
        executor: Arc<dyn ExitExecutor>,
        store: Arc<dyn TrackerStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            store,
            locks: ExitLocks::new(),
            call_timeout,
        }
    }

    /// The lock registry, shared with anything that wants to peek at it
    pub fn locks(&self) -> &ExitLocks {
        &self.locks
    }

    /// Request an exit for a tracker
    ///
    /// Claims the tracker's exit slot, re-fetches the tracker to confirm it
    /// is still active, then runs the executor under a timeout. At-least-once
    /// delivery: a failed attempt leaves the tracker active and the next
    /// tick or sweep retries, so executors must be idempotent.
    pub async fn request_exit(&self, tracker_id: TrackerId, reason: &str) -> ExitResolution {
        let Some(_guard) = self.locks.begin(tracker_id) else {
            debug!(tracker_id, reason, "Exit already in flight, skipping");
            increment(CounterMetric::ExitSkipped);
            return ExitResolution::AlreadyInFlight;
        };

        let tracker = match self.store.get(tracker_id).await {
            Ok(Some(tracker)) => tracker,
            Ok(None) => {
                warn!(tracker_id, "Exit requested for unknown tracker");
                return ExitResolution::Inactive;
            }
            Err(e) => {
                error!(tracker_id, error = %e, "Tracker lookup failed before exit");
                increment(CounterMetric::ExitFailed);
                return ExitResolution::Failed(e.to_string());
            }
        };
        if !tracker.is_active() {
            debug!(tracker_id, status = %tracker.status, "Tracker no longer active, skipping exit");
            increment(CounterMetric::ExitSkipped);
            return ExitResolution::Inactive;
        }

        info!(tracker_id, reason, "Executing exit");
        let result = tokio::time::timeout(
            self.call_timeout,
            self.executor.execute_exit(&tracker, reason),
        )
        .await;

        match result {
            Ok(Ok(ExitOutcome { success: true, detail })) => {
                info!(tracker_id, reason, detail = %detail, "Exit executed");
                increment(CounterMetric::ExitExecuted);
                ExitResolution::Executed(detail)
            }
            Ok(Ok(ExitOutcome { success: false, detail })) => {
                warn!(tracker_id, reason, detail = %detail, "Exit reported failure");
                increment(CounterMetric::ExitFailed);
                ExitResolution::Failed(detail)
            }
            Ok(Err(e)) => {
                error!(tracker_id, reason, error = %e, "Exit execution failed");
                increment(CounterMetric::ExitFailed);
                ExitResolution::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    tracker_id,
                    reason,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "Exit execution timed out"
                );
                increment(CounterMetric::ExitFailed);
                ExitResolution::Failed("execution timed out".to_string())
            }
        }
    }
}
