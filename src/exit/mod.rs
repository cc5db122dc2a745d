//! Exit execution module
//!
//! Everything between "a rule decided to exit" and "the position is gone":
//! the executor contract, the per-tracker lock that keeps the tick path and
//! the sweep from double-firing, and the coordinator both drivers share.

mod coordinator;
mod locks;
mod paper;
mod types;

pub use coordinator::{ExitCoordinator, ExitResolution};
pub use locks::{ExitGuard, ExitLocks};
pub use paper::PaperExitExecutor;
pub use types::{ExitError, ExitOutcome};

use async_trait::async_trait;

use crate::tracker::Tracker;

/// Trait for exit executor implementations
///
/// Implementations must be idempotent: executing an exit for a tracker
/// already in a terminal state returns success with an "already exited"
/// detail rather than an error. On success the implementation is
/// responsible for removing the position from the cache and clearing the
/// tracker's durable peak entry. On failure the tracker stays active and
/// the request is retried by the next tick or sweep.
#[async_trait]
pub trait ExitExecutor: Send + Sync {
    /// Close the tracker's position for the given reason
    async fn execute_exit(&self, tracker: &Tracker, reason: &str) -> Result<ExitOutcome, ExitError>;
}
