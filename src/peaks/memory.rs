//! In-memory peak store for tests and dry runs

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::PeakStore;
use crate::tracker::TrackerId;

/// Peak store with no persistence
#[derive(Default)]
pub struct MemoryPeakStore {
    entries: RwLock<HashMap<TrackerId, (Decimal, Instant)>>,
}

impl MemoryPeakStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeakStore for MemoryPeakStore {
    async fn get(&self, id: TrackerId) -> anyhow::Result<Option<Decimal>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id).and_then(|(peak, deadline)| {
            if Instant::now() < *deadline {
                Some(*peak)
            } else {
                None
            }
        }))
    }

    async fn set(&self, id: TrackerId, peak_pct: Decimal, ttl: Duration) -> anyhow::Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(id, (peak_pct, Instant::now() + ttl));
        Ok(())
    }

    async fn clear(&self, id: TrackerId) -> anyhow::Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&id);
        Ok(())
    }
}
