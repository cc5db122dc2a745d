//! Sweep command implementation
//!
//! One-shot hard-limit pass over the recovered position set, an
//! operational escape hatch when the engine is not running.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::cache::{recover, PositionCache};
use crate::config::Config;
use crate::exit::{ExitCoordinator, PaperExitExecutor};
use crate::peaks::JsonPeakStore;
use crate::sweep::RiskSweeper;
use crate::tracker::JsonTrackerStore;

#[derive(Args, Debug)]
pub struct SweepArgs {}

impl SweepArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = Arc::new(JsonTrackerStore::open(&config.store.path)?);
        let peaks = Arc::new(JsonPeakStore::open(&config.peaks.path)?);
        let cache = Arc::new(PositionCache::new());
        recover(&cache, store.as_ref(), peaks.as_ref()).await?;

        let executor = Arc::new(PaperExitExecutor::new(
            store.clone(),
            cache.clone(),
            peaks.clone(),
        ));
        let coordinator = Arc::new(ExitCoordinator::new(
            executor,
            store.clone(),
            Duration::from_millis(config.sweep.exit_timeout_ms),
        ));
        let sweeper = RiskSweeper::new(
            cache,
            coordinator,
            config.risk.clone(),
            config.sweep.clone(),
        );

        let summary = sweeper.sweep_once().await;
        println!(
            "Sweep complete: checked={} exits_requested={} skipped={}",
            summary.checked, summary.exits_requested, summary.skipped
        );
        Ok(())
    }
}
