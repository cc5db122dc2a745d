//! Tick-driven trailing evaluation
//!
//! Runs once per tick per position: tier the stop-loss up with profit,
//! lock breakeven, and fire the peak-drawdown and currency trailing exits.

mod evaluator;

pub use evaluator::{Evaluation, TrailingEvaluator};
