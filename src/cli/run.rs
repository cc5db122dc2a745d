//! Run command implementation
//!
//! Composition root: wires stores, cache, evaluator, sweeper and feed
//! together, recovers state, and runs until the feed ends or ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use crate::cache::{recover, PositionCache};
use crate::config::Config;
use crate::exit::{ExitCoordinator, PaperExitExecutor};
use crate::feed::{ReplayFeed, TickFeed, TickRouter};
use crate::peaks::JsonPeakStore;
use crate::sweep::RiskSweeper;
use crate::telemetry::{set_gauge, GaugeMetric};
use crate::tracker::JsonTrackerStore;
use crate::trailing::TrailingEvaluator;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Tick file to replay, overriding the configured feed
    #[arg(long)]
    pub ticks: Option<PathBuf>,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = Arc::new(JsonTrackerStore::open(&config.store.path)?);
        let peaks = Arc::new(JsonPeakStore::open(&config.peaks.path)?);
        let cache = Arc::new(
            PositionCache::new()
                .with_peak_store(
                    peaks.clone(),
                    Duration::from_secs(config.peaks.ttl_secs),
                    Duration::from_millis(config.peaks.write_timeout_ms),
                )
                .with_tracker_store(
                    store.clone(),
                    Duration::from_millis(config.store.write_timeout_ms),
                ),
        );

        let restored = recover(&cache, store.as_ref(), peaks.as_ref()).await?;
        set_gauge(GaugeMetric::OpenPositions, restored as f64);

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
        let evaluator = Arc::new(
            TrailingEvaluator::new(config.risk.clone(), cache.clone())
                .with_coordinator(coordinator.clone()),
        );

        let sweeper = Arc::new(RiskSweeper::new(
            cache.clone(),
            coordinator,
            config.risk.clone(),
            config.sweep.clone(),
        ));
        let sweeper_handle = sweeper.start();

        let replay_path = self.ticks.clone().or_else(|| config.feed.replay_path.clone());
        match replay_path {
            Some(path) => {
                let feed = ReplayFeed::new(
                    &path,
                    Duration::from_millis(config.feed.tick_delay_ms),
                );
                let ticks = feed.subscribe().await?;
                let router = TickRouter::new(cache.clone(), evaluator);

                tokio::select! {
                    stats = router.run(ticks) => {
                        info!(
                            processed = stats.processed,
                            dropped = stats.dropped,
                            "Feed drained"
                        );
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted");
                    }
                }
            }
            None => {
                info!("No tick feed configured, sweeping only until ctrl-c");
                tokio::signal::ctrl_c().await?;
            }
        }

        sweeper_handle.stop().await;
        set_gauge(GaugeMetric::OpenPositions, cache.len() as f64);
        info!(open_positions = cache.len(), "Shutdown complete");
        Ok(())
    }
}
