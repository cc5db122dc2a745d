use clap::Parser;
use opt_sentry::cli::{Cli, Commands};
use opt_sentry::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize telemetry
    opt_sentry::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting position guard");
            args.execute(&config).await?;
        }
        Commands::Sweep(args) => {
            tracing::info!("Starting one-shot risk sweep");
            args.execute(&config).await?;
        }
        Commands::Status(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Risk: SL={}%, TP={}%, cutoff={}",
                config.risk.sl_pct,
                config.risk.tp_pct,
                config
                    .sweep
                    .time_exit_cutoff
                    .map(|t| t.format("%H:%M").to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
            println!(
                "  Trailing: step={}%, drop={}%, breakeven_after={}%",
                config.risk.trail_step_pct,
                config.risk.exit_drop_pct,
                config.risk.breakeven_after_gain_pct
            );
            println!(
                "  Tiers: {}",
                config
                    .risk
                    .tiers
                    .iter()
                    .map(|t| format!("{}%->{}%", t.threshold_pct, t.sl_offset_pct))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("  Sweep: every {}s", config.sweep.period_secs);
            println!(
                "  Stores: trackers={}, peaks={}",
                config.store.path.display(),
                config.peaks.path.display()
            );
        }
    }

    Ok(())
}
