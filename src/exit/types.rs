//! Exit execution types

use thiserror::Error;

/// Result reported by an exit executor
#[derive(Debug, Clone)]
pub struct ExitOutcome {
    /// Whether the exit is done (including the already-exited no-op)
    pub success: bool,
    /// Human-readable description for logs
    pub detail: String,
}

impl ExitOutcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }

    /// The idempotent no-op outcome for an already-terminal tracker
    pub fn already_exited() -> Self {
        Self::success("already exited")
    }
}

/// Exit execution errors
#[derive(Debug, Error)]
pub enum ExitError {
    /// Order placement or downstream call failed
    #[error("Exit execution failed: {0}")]
    Execution(String),
    /// Tracker store failure
    #[error("Tracker store failure: {0}")]
    Store(#[from] anyhow::Error),
}
