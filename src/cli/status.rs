//! Status command implementation

use clap::Args;

use crate::config::Config;
use crate::tracker::{JsonTrackerStore, TrackerStore};

#[derive(Args, Debug)]
pub struct StatusArgs {}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = JsonTrackerStore::open(&config.store.path)?;
        let active = store.active().await?;

        if active.is_empty() {
            println!("No open positions");
            return Ok(());
        }

        println!("Open positions ({}):", active.len());
        for tracker in active {
            println!(
                "  #{} {}:{} entry={} qty={} hwm_pnl={} breakeven={} trail_stop={}",
                tracker.id,
                tracker.segment,
                tracker.security_id,
                tracker.entry_price,
                tracker.quantity,
                tracker.high_water_mark_pnl,
                tracker.breakeven_locked,
                tracker
                    .trailing_stop_price
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
        Ok(())
    }
}
