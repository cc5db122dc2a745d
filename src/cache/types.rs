//! Position cache types

use rust_decimal::Decimal;
use thiserror::Error;

use crate::tracker::{TrackerId, TrackerStatus};

/// Position cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Tracker is not in active status
    #[error("Tracker {0} is not active: {1}")]
    TrackerNotActive(TrackerId, TrackerStatus),
    /// Entry price must be positive
    #[error("Tracker {0} has invalid entry price {1}")]
    InvalidEntryPrice(TrackerId, Decimal),
    /// Quantity must be non-zero
    #[error("Tracker {0} has zero quantity")]
    ZeroQuantity(TrackerId),
}
