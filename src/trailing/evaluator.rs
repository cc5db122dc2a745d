//! Trailing stop evaluation

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::cache::{PositionCache, PositionSnapshot, SnapshotPatch};
use crate::config::{RiskConfig, SlTier};
use crate::exit::ExitCoordinator;

/// What one evaluation pass decided for one position
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// A tier moved the stop-loss
    pub sl_updated: bool,
    /// The stop-loss price after this pass, if moved
    pub new_sl: Option<Decimal>,
    /// Breakeven was locked during this pass
    pub breakeven_locked: bool,
    /// This tick advanced the peak profit percentage
    pub peak_updated: bool,
    /// An exit condition fired
    pub exit_triggered: bool,
    /// Exit reason, set when an exit condition fired
    pub reason: Option<String>,
}

/// Per-tick risk evaluator
///
/// Decides from a single snapshot; never fetches external data. Writes
/// stop moves back through the cache and routes exit requests through the
/// coordinator when one is wired.
pub struct TrailingEvaluator {
    config: RiskConfig,
    cache: Arc<PositionCache>,
    coordinator: Option<Arc<ExitCoordinator>>,
}

impl TrailingEvaluator {
    pub fn new(config: RiskConfig, cache: Arc<PositionCache>) -> Self {
        let mut config = config;
        config
            .tiers
            .sort_by(|a, b| a.threshold_pct.cmp(&b.threshold_pct));
        Self {
            config,
            cache,
            coordinator: None,
        }
    }

    /// Route exit decisions through a coordinator
    pub fn with_coordinator(mut self, coordinator: Arc<ExitCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Evaluate one freshly ticked snapshot
    ///
    /// Rule order: tier the stop, lock breakeven, then the exits in
    /// priority order (peak drawdown before currency trail). At most one
    /// exit request per call. An executor failure is logged and the
    /// already-applied stop move stays; the next tick or sweep retries.
    pub async fn evaluate(&self, snapshot: &PositionSnapshot) -> Evaluation {
        let mut evaluation = Evaluation::default();
        if !snapshot.is_valid() || snapshot.current_ltp.is_none() {
            warn!(
                tracker_id = snapshot.tracker_id,
                "Skipping evaluation of unpriced snapshot"
            );
            return evaluation;
        }

        let mut patch = SnapshotPatch::default();

        if let Some(new_sl) = self.tier_stop(snapshot) {
            patch.sl_price = Some(new_sl);
            // The tiered stop is the trailing stop the tracker persists
            patch.trailing_stop_price = Some(new_sl);
            evaluation.sl_updated = true;
            evaluation.new_sl = Some(new_sl);
            info!(
                tracker_id = snapshot.tracker_id,
                instrument = %snapshot.key(),
                pnl_pct = %snapshot.pnl_pct.normalize(),
                new_sl = %new_sl.normalize(),
                old_sl = ?snapshot.sl_price,
                "Stop-loss tiered up"
            );
        }

        if !snapshot.breakeven_locked && snapshot.pnl_pct >= self.config.breakeven_after_gain_pct {
            patch.breakeven_locked = Some(true);
            evaluation.breakeven_locked = true;
            info!(
                tracker_id = snapshot.tracker_id,
                pnl_pct = %snapshot.pnl_pct.normalize(),
                "Breakeven locked"
            );
        }

        evaluation.peak_updated = snapshot.peak_advanced;

        if !patch.is_empty() {
            self.cache.apply(snapshot.tracker_id, patch);
        }

        if let Some(reason) = self.exit_reason(snapshot) {
            evaluation.exit_triggered = true;
            evaluation.reason = Some(reason.clone());
            match &self.coordinator {
                Some(coordinator) => {
                    let resolution = coordinator
                        .request_exit(snapshot.tracker_id, &reason)
                        .await;
                    debug!(
                        tracker_id = snapshot.tracker_id,
                        reason,
                        resolution = ?resolution,
                        "Exit request resolved"
                    );
                }
                None => {
                    debug!(
                        tracker_id = snapshot.tracker_id,
                        reason, "Exit triggered without executor, reporting only"
                    );
                }
            }
        }

        evaluation
    }

    /// Highest armed tier whose stop improves on the current one
    fn tier_stop(&self, snapshot: &PositionSnapshot) -> Option<Decimal> {
        let tier = self.armed_tier(snapshot.pnl_pct)?;
        let candidate =
            snapshot.entry_price * (Decimal::ONE + tier.sl_offset_pct / dec!(100));
        let improves = match snapshot.sl_price {
            // Tightening direction depends on side: stops ratchet toward
            // profit, never away from it
            Some(current) if snapshot.is_long() => candidate > current,
            Some(current) => candidate < current,
            None => true,
        };
        improves.then_some(candidate)
    }

    fn armed_tier(&self, pnl_pct: Decimal) -> Option<&SlTier> {
        self.config
            .tiers
            .iter()
            .rev()
            .find(|tier| pnl_pct >= tier.threshold_pct)
    }

    /// First exit rule that fires, in priority order
    fn exit_reason(&self, snapshot: &PositionSnapshot) -> Option<String> {
        if snapshot.peak_profit_pct >= self.config.min_activation_pct
            && snapshot.peak_profit_pct - snapshot.pnl_pct >= self.config.peak_drawdown_pct
        {
            return Some(format!(
                "peak_drawdown_exit(peak={},now={})",
                snapshot.peak_profit_pct.normalize(),
                snapshot.pnl_pct.normalize()
            ));
        }

        let step = snapshot.entry_cost().abs() * self.config.trail_step_pct / dec!(100);
        let ready = snapshot.high_water_mark >= step && snapshot.high_water_mark > Decimal::ZERO;
        if ready {
            let give_back = snapshot.high_water_mark - snapshot.pnl;
            let pct_threshold = snapshot.high_water_mark * self.config.exit_drop_pct / dec!(100);
            let fired = give_back >= pct_threshold
                || self
                    .config
                    .exit_drop_abs
                    .is_some_and(|abs| give_back >= abs);
            if fired {
                return Some("trailing_stop_exit".to_string());
            }
        }

        None
    }
}
