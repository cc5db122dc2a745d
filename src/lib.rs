//! opt-sentry: Risk guard for intraday options positions
//!
//! This library provides the core components for:
//! - In-memory position cache keyed by instrument, rebuilt from the tracker store
//! - Tick-driven trailing evaluation: tiered stops, breakeven lock, drawdown exits
//! - Periodic risk sweep for hard SL/TP and the end-of-day time cutoff
//! - Durable profit-peak store so trailing state survives restarts
//! - Exit coordination that fires each exit exactly once across racing paths
//! - Tick replay feed for paper runs
//! - Full observability stack

pub mod cache;
pub mod cli;
pub mod config;
pub mod exit;
pub mod feed;
pub mod peaks;
pub mod sweep;
pub mod telemetry;
pub mod tracker;
pub mod trailing;
