//! JSONL tick replay feed
//!
//! Reads one JSON tick per line and streams them over a channel, with an
//! optional inter-tick delay. Used by paper runs and integration tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Tick, TickFeed};

const CHANNEL_CAPACITY: usize = 256;

/// Tick feed replaying a recorded JSONL file
pub struct ReplayFeed {
    path: PathBuf,
    tick_delay: Duration,
}

impl ReplayFeed {
    pub fn new(path: impl AsRef<Path>, tick_delay: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            tick_delay,
        }
    }
}

#[async_trait]
impl TickFeed for ReplayFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<Tick>> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open tick file {}", self.path.display()))?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let delay = self.tick_delay;
        let path = self.path.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0u64;
            let mut sent = 0u64;
            while let Ok(Some(line)) = lines.next_line().await {
                line_no += 1;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Tick>(line) {
                    Ok(tick) => {
                        if tx.send(tick).await.is_err() {
                            debug!("Tick receiver dropped, stopping replay");
                            return;
                        }
                        sent += 1;
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Err(e) => {
                        warn!(line = line_no, error = %e, "Skipping malformed tick line");
                    }
                }
            }
            debug!(sent, path = %path.display(), "Replay finished");
        });

        Ok(rx)
    }
}
