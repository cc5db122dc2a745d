//! Tick feed module
//!
//! Price tick ingestion and dispatch. The live broker transport stays
//! outside this crate; paper runs and tests replay recorded ticks.

mod replay;
mod router;
mod types;

pub use replay::ReplayFeed;
pub use router::{RouterStats, TickRouter};
pub use types::Tick;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for tick feed implementations
#[async_trait]
pub trait TickFeed: Send + Sync {
    /// Subscribe to tick updates
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<Tick>>;
}
