//! JSON-file peak store
//!
//! One JSON document mapping tracker id to peak entry. The open-position set
//! is small, so every write rewrites the whole file; expired entries are
//! pruned on load and on read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::PeakStore;
use crate::tracker::TrackerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PeakEntry {
    peak_pct: Decimal,
    expires_at: DateTime<Utc>,
}

impl PeakEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Peak store persisted as a single JSON document
pub struct JsonPeakStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<TrackerId, PeakEntry>>,
}

impl JsonPeakStore {
    /// Open a store at `path`, pruning entries that expired while down
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries: BTreeMap<TrackerId, PeakEntry> = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read peak store {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse peak store {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        if entries.len() < before {
            debug!(
                pruned = before - entries.len(),
                path = %path.display(),
                "Pruned expired peak entries"
            );
        }

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &BTreeMap<TrackerId, PeakEntry>) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(entries).context("Failed to serialize peaks")?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create peak store dir {}", parent.display())
                })?;
            }
        }
        std::fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write peak store {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl PeakStore for JsonPeakStore {
    async fn get(&self, id: TrackerId) -> anyhow::Result<Option<Decimal>> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        match entries.get(&id) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(&id);
                self.flush(&entries)?;
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.peak_pct)),
            None => Ok(None),
        }
    }

    async fn set(&self, id: TrackerId, peak_pct: Decimal, ttl: Duration) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).context("Peak TTL out of range")?;
        entries.insert(
            id,
            PeakEntry {
                peak_pct,
                expires_at,
            },
        );
        self.flush(&entries)
    }

    async fn clear(&self, id: TrackerId) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(&id).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}
