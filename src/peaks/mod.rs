//! Durable peak-profit storage
//!
//! The peak-drawdown rule needs the highest profit percentage ever seen per
//! tracker to survive process restarts. Stores are keyed by tracker id and
//! carry a TTL so entries for long-gone trades age out on their own.

mod json_store;
mod memory;

pub use json_store::JsonPeakStore;
pub use memory::MemoryPeakStore;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::tracker::TrackerId;

/// Trait for durable peak-profit stores
#[async_trait]
pub trait PeakStore: Send + Sync {
    /// Stored peak profit percentage for a tracker, if present and fresh
    async fn get(&self, id: TrackerId) -> anyhow::Result<Option<Decimal>>;
    /// Persist a peak profit percentage with a time-to-live
    async fn set(&self, id: TrackerId, peak_pct: Decimal, ttl: Duration) -> anyhow::Result<()>;
    /// Drop the entry for a tracker (called after a confirmed exit)
    async fn clear(&self, id: TrackerId) -> anyhow::Result<()>;
}
