//! Tick dispatch
//!
//! Drains a tick channel into the cache and runs the evaluator on every
//! priced position. One bad tick or one failing position never stops the
//! stream.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::Tick;
use crate::cache::PositionCache;
use crate::telemetry::{increment, record_latency, CounterMetric, LatencyMetric};
use crate::trailing::TrailingEvaluator;

/// Counters from one router run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Ticks that updated a cached position
    pub processed: u64,
    /// Ticks ignored (bad price or no position on the instrument)
    pub dropped: u64,
}

/// Consumes a tick stream and drives per-position evaluation
pub struct TickRouter {
    cache: Arc<PositionCache>,
    evaluator: Arc<TrailingEvaluator>,
}

impl TickRouter {
    pub fn new(cache: Arc<PositionCache>, evaluator: Arc<TrailingEvaluator>) -> Self {
        Self { cache, evaluator }
    }

    /// Drain the channel until the feed ends
    pub async fn run(&self, mut ticks: mpsc::Receiver<Tick>) -> RouterStats {
        let mut stats = RouterStats::default();
        while let Some(tick) = ticks.recv().await {
            self.dispatch(&tick, &mut stats).await;
        }
        info!(
            processed = stats.processed,
            dropped = stats.dropped,
            "Tick stream ended"
        );
        stats
    }

    /// Route one tick: update the cache, then evaluate the hit position
    ///
    /// Ticks with a non-positive price are dropped with a warning; ticks
    /// for instruments without a position are ignored but still feed the
    /// last-price map via the cache.
    pub async fn dispatch(&self, tick: &Tick, stats: &mut RouterStats) {
        let started = Instant::now();

        if tick.ltp <= Decimal::ZERO {
            warn!(instrument = %tick.key(), ltp = %tick.ltp, "Dropping tick with bad price");
            stats.dropped += 1;
            increment(CounterMetric::TickDropped);
            return;
        }

        let Some(snapshot) = self.cache.update_ltp(&tick.key(), tick.ltp, tick.ts) else {
            stats.dropped += 1;
            increment(CounterMetric::TickDropped);
            return;
        };

        self.evaluator.evaluate(&snapshot).await;
        stats.processed += 1;
        increment(CounterMetric::TickProcessed);
        record_latency(LatencyMetric::TickDispatch, started.elapsed());
    }
}
