//! Trade tracker records
//!
//! The tracker is the persisted record of one entry order and its lifecycle.
//! This core only consumes the narrow shape below; entry signal generation
//! and order placement live outside it.

mod json_store;

pub use json_store::JsonTrackerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tracker identity assigned by the external store
pub type TrackerId = i64;

/// Lifecycle state of a tracker
///
/// pending -> active -> {exited, cancelled}. Only active trackers have a
/// position snapshot in the cache; exited and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerStatus {
    /// Entry order submitted, not yet filled
    Pending,
    /// Entry filled, position open
    Active,
    /// Position closed by an exit
    Exited,
    /// Entry order cancelled before fill
    Cancelled,
}

impl TrackerStatus {
    /// Whether this state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackerStatus::Exited | TrackerStatus::Cancelled)
    }
}

impl std::fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerStatus::Pending => write!(f, "pending"),
            TrackerStatus::Active => write!(f, "active"),
            TrackerStatus::Exited => write!(f, "exited"),
            TrackerStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One tracked trade as persisted by the external store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracker {
    /// Store-assigned identity
    pub id: TrackerId,
    /// Exchange security identifier
    pub security_id: String,
    /// Exchange segment (e.g. "NSE_FNO")
    pub segment: String,
    /// Average entry fill price
    pub entry_price: Decimal,
    /// Signed quantity, positive = long
    pub quantity: i64,
    /// Lifecycle state
    pub status: TrackerStatus,
    /// Highest currency PnL persisted so far
    pub high_water_mark_pnl: Decimal,
    /// Whether the stop has been locked at no worse than entry
    pub breakeven_locked: bool,
    /// Last persisted trailing stop price
    pub trailing_stop_price: Option<Decimal>,
    /// Reason recorded when the tracker exited
    pub exit_reason: Option<String>,
    /// Fill price of the exit order, once known
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    /// When the exit was recorded
    #[serde(default)]
    pub exited_at: Option<DateTime<Utc>>,
}

impl Tracker {
    /// Whether the position is open and managed
    pub fn is_active(&self) -> bool {
        self.status == TrackerStatus::Active
    }
}

/// Partial update persisted against a tracker
///
/// Explicit optional fields only; unset fields are left untouched by the
/// store.
#[derive(Debug, Clone, Default)]
pub struct TrackerUpdate {
    pub high_water_mark_pnl: Option<Decimal>,
    pub breakeven_locked: Option<bool>,
    pub trailing_stop_price: Option<Decimal>,
    pub exit_reason: Option<String>,
    pub exit_price: Option<Decimal>,
    pub exited_at: Option<DateTime<Utc>>,
}

impl TrackerUpdate {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.high_water_mark_pnl.is_none()
            && self.breakeven_locked.is_none()
            && self.trailing_stop_price.is_none()
            && self.exit_reason.is_none()
            && self.exit_price.is_none()
            && self.exited_at.is_none()
    }
}

/// Trait for tracker store implementations
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// All trackers currently in active status, in id order
    async fn active(&self) -> anyhow::Result<Vec<Tracker>>;
    /// Fetch one tracker by id
    async fn get(&self, id: TrackerId) -> anyhow::Result<Option<Tracker>>;
    /// Persist a partial update against a tracker
    async fn update(&self, id: TrackerId, update: TrackerUpdate) -> anyhow::Result<()>;
    /// Atomically transition status from `from` to `to`, recording `update`
    ///
    /// Returns false without modifying anything if the tracker is missing or
    /// its status is not `from`. The check and the write happen under the
    /// store's own lock, which is the critical section that makes exits
    /// idempotent across drivers.
    async fn try_transition(
        &self,
        id: TrackerId,
        from: TrackerStatus,
        to: TrackerStatus,
        update: TrackerUpdate,
    ) -> anyhow::Result<bool>;
}
