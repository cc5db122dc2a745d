//! Periodic risk sweep
//!
//! Tick-independent safety net: every few seconds each open position is
//! re-checked against the hard stop-loss, take-profit and end-of-day
//! cutoff, so a position whose feed went quiet still gets closed.

mod sweeper;

pub use sweeper::{past_cutoff, RiskSweeper, SweepSummary, SweeperHandle};
