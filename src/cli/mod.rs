//! CLI interface for opt-sentry
//!
//! Provides subcommands for:
//! - `run`: Start the risk engine over the configured feed
//! - `sweep`: One manual hard-limit pass, then exit
//! - `status`: Show open positions from the tracker store
//! - `config`: Show the effective configuration

mod run;
mod status;
mod sweep;

pub use run::RunArgs;
pub use status::StatusArgs;
pub use sweep::SweepArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "opt-sentry")]
#[command(about = "Risk-management engine for an options-trading bot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the risk engine
    Run(RunArgs),
    /// Run one hard-limit sweep pass and exit
    Sweep(SweepArgs),
    /// Show open positions
    Status(StatusArgs),
    /// Show the effective configuration
    Config,
}
