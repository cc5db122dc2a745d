//! Configuration types for opt-sentry

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// Root configuration structure
///
/// Every section has full defaults, so a partial file (or none at all)
/// still yields a runnable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub peaks: PeaksConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// One rung of the tiered stop-loss ladder
///
/// Written in TOML as a two-element array: `[threshold_pct, sl_offset_pct]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "(Decimal, Decimal)")]
pub struct SlTier {
    /// Profit percentage that arms this rung
    pub threshold_pct: Decimal,
    /// Stop offset from entry, in percent (negative = below entry)
    pub sl_offset_pct: Decimal,
}

impl From<(Decimal, Decimal)> for SlTier {
    fn from((threshold_pct, sl_offset_pct): (Decimal, Decimal)) -> Self {
        Self {
            threshold_pct,
            sl_offset_pct,
        }
    }
}

/// Risk rule configuration, shared by the evaluator and the sweeper
///
/// All percentages are in percent units: 5.0 means 5%.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Hard stop-loss threshold on pnl percentage
    #[serde(default = "default_sl_pct")]
    pub sl_pct: Decimal,

    /// Hard take-profit threshold on pnl percentage
    #[serde(default = "default_tp_pct")]
    pub tp_pct: Decimal,

    /// Profit step (as percent of entry cost) that arms the currency trail
    #[serde(default = "default_trail_step_pct")]
    pub trail_step_pct: Decimal,

    /// Give-back from the high water mark that fires the currency trail
    #[serde(default = "default_exit_drop_pct")]
    pub exit_drop_pct: Decimal,

    /// Optional absolute currency give-back that also fires the trail
    #[serde(default)]
    pub exit_drop_abs: Option<Decimal>,

    /// Profit percentage that locks the stop at breakeven
    #[serde(default = "default_breakeven_after_gain_pct")]
    pub breakeven_after_gain_pct: Decimal,

    /// Give-back in profit percentage points that fires the drawdown exit
    #[serde(default = "default_peak_drawdown_pct")]
    pub peak_drawdown_pct: Decimal,

    /// Peak percentage below which the drawdown exit stays disarmed
    #[serde(default = "default_min_activation_pct")]
    pub min_activation_pct: Decimal,

    /// Ascending stop-loss ladder
    #[serde(default = "default_tiers")]
    pub tiers: Vec<SlTier>,
}

fn default_sl_pct() -> Decimal {
    dec!(30)
}
fn default_tp_pct() -> Decimal {
    dec!(50)
}
fn default_trail_step_pct() -> Decimal {
    dec!(5)
}
fn default_exit_drop_pct() -> Decimal {
    dec!(3)
}
fn default_breakeven_after_gain_pct() -> Decimal {
    dec!(35)
}
fn default_peak_drawdown_pct() -> Decimal {
    dec!(5)
}
fn default_min_activation_pct() -> Decimal {
    dec!(10)
}
fn default_tiers() -> Vec<SlTier> {
    vec![
        SlTier::from((dec!(5), dec!(-15))),
        SlTier::from((dec!(10), dec!(-5))),
        SlTier::from((dec!(15), dec!(0))),
        SlTier::from((dec!(25), dec!(10))),
    ]
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sl_pct: default_sl_pct(),
            tp_pct: default_tp_pct(),
            trail_step_pct: default_trail_step_pct(),
            exit_drop_pct: default_exit_drop_pct(),
            exit_drop_abs: None,
            breakeven_after_gain_pct: default_breakeven_after_gain_pct(),
            peak_drawdown_pct: default_peak_drawdown_pct(),
            min_activation_pct: default_min_activation_pct(),
            tiers: default_tiers(),
        }
    }
}

/// Periodic risk sweep configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweep passes
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Exchange-local time of day that forces every position out
    #[serde(default = "default_time_exit_cutoff", deserialize_with = "de_cutoff")]
    pub time_exit_cutoff: Option<NaiveTime>,

    /// Exchange timezone offset from UTC in minutes (IST = 330)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Timeout for one exit execution call, milliseconds
    #[serde(default = "default_exit_timeout_ms")]
    pub exit_timeout_ms: u64,
}

fn default_period_secs() -> u64 {
    30
}
fn default_time_exit_cutoff() -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(15, 15, 0)
}
fn default_utc_offset_minutes() -> i32 {
    330
}
fn default_exit_timeout_ms() -> u64 {
    5000
}

/// Accepts "HH:MM" or "HH:MM:SS"; an empty string disables the cutoff
fn de_cutoff<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            time_exit_cutoff: default_time_exit_cutoff(),
            utc_offset_minutes: default_utc_offset_minutes(),
            exit_timeout_ms: default_exit_timeout_ms(),
        }
    }
}

/// Durable peak store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PeaksConfig {
    /// Peak file location
    #[serde(default = "default_peaks_path")]
    pub path: PathBuf,

    /// Entry time-to-live in seconds
    #[serde(default = "default_peaks_ttl_secs")]
    pub ttl_secs: u64,

    /// Timeout for one fire-and-forget peak write, milliseconds
    #[serde(default = "default_peak_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_peaks_path() -> PathBuf {
    PathBuf::from("data/peaks.json")
}
fn default_peaks_ttl_secs() -> u64 {
    86_400
}
fn default_peak_write_timeout_ms() -> u64 {
    250
}

impl Default for PeaksConfig {
    fn default() -> Self {
        Self {
            path: default_peaks_path(),
            ttl_secs: default_peaks_ttl_secs(),
            write_timeout_ms: default_peak_write_timeout_ms(),
        }
    }
}

/// Tracker store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Tracker file location (paper mode)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Timeout for one fire-and-forget tightening write, milliseconds
    #[serde(default = "default_store_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/trackers.json")
}
fn default_store_write_timeout_ms() -> u64 {
    250
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            write_timeout_ms: default_store_write_timeout_ms(),
        }
    }
}

/// Tick feed configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    /// JSONL tick file to replay; no feed runs when unset
    #[serde(default)]
    pub replay_path: Option<PathBuf>,

    /// Delay between replayed ticks, milliseconds
    #[serde(default)]
    pub tick_delay_ms: u64,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Default log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port; exporter disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.risk.sl_pct, dec!(30));
        assert_eq!(config.risk.tp_pct, dec!(50));
        assert_eq!(config.sweep.period_secs, 30);
        assert_eq!(config.sweep.utc_offset_minutes, 330);
        assert_eq!(config.peaks.ttl_secs, 86_400);
        assert_eq!(config.store.write_timeout_ms, 250);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.feed.replay_path.is_none());
    }

    #[test]
    fn test_default_tiers_ascending() {
        let config = RiskConfig::default();
        assert_eq!(config.tiers.len(), 4);
        assert_eq!(config.tiers[0].threshold_pct, dec!(5));
        assert_eq!(config.tiers[0].sl_offset_pct, dec!(-15));
        assert_eq!(config.tiers[3].threshold_pct, dec!(25));
        assert_eq!(config.tiers[3].sl_offset_pct, dec!(10));
        for pair in config.tiers.windows(2) {
            assert!(pair[0].threshold_pct < pair[1].threshold_pct);
        }
    }

    #[test]
    fn test_full_config_deserialize() {
        let toml = r#"
            [risk]
            sl_pct = 25
            tp_pct = 60
            trail_step_pct = 4
            exit_drop_pct = 2.5
            exit_drop_abs = 500
            breakeven_after_gain_pct = 30
            peak_drawdown_pct = 6
            min_activation_pct = 12
            tiers = [[5, -15], [10, -5], [15, 0]]

            [sweep]
            period_secs = 10
            time_exit_cutoff = "15:20"
            utc_offset_minutes = 330
            exit_timeout_ms = 3000

            [peaks]
            path = "run/peaks.json"
            ttl_secs = 3600
            write_timeout_ms = 100

            [store]
            path = "run/trackers.json"
            write_timeout_ms = 100

            [feed]
            replay_path = "run/ticks.jsonl"
            tick_delay_ms = 5

            [telemetry]
            log_level = "debug"
            metrics_port = 9090
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.risk.sl_pct, dec!(25));
        assert_eq!(config.risk.exit_drop_abs, Some(dec!(500)));
        assert_eq!(config.risk.tiers.len(), 3);
        assert_eq!(config.risk.tiers[1].sl_offset_pct, dec!(-5));
        assert_eq!(
            config.sweep.time_exit_cutoff,
            NaiveTime::from_hms_opt(15, 20, 0)
        );
        assert_eq!(config.sweep.exit_timeout_ms, 3000);
        assert_eq!(config.peaks.path, PathBuf::from("run/peaks.json"));
        assert_eq!(config.store.write_timeout_ms, 100);
        assert_eq!(config.feed.tick_delay_ms, 5);
        assert_eq!(config.telemetry.metrics_port, Some(9090));
    }

    #[test]
    fn test_cutoff_empty_string_disables() {
        let toml = r#"
            [sweep]
            time_exit_cutoff = ""
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sweep.time_exit_cutoff, None);
    }

    #[test]
    fn test_cutoff_accepts_seconds() {
        let toml = r#"
            [sweep]
            time_exit_cutoff = "15:15:30"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.sweep.time_exit_cutoff,
            NaiveTime::from_hms_opt(15, 15, 30)
        );
    }

    #[test]
    fn test_cutoff_rejects_garbage() {
        let toml = r#"
            [sweep]
            time_exit_cutoff = "quarter past three"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_partial_risk_section() {
        let toml = r#"
            [risk]
            sl_pct = 20
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.risk.sl_pct, dec!(20));
        assert_eq!(config.risk.tp_pct, dec!(50));
        assert_eq!(config.risk.tiers.len(), 4);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }
}
