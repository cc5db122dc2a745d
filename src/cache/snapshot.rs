//! Position snapshot types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::tracker::{Tracker, TrackerId};

/// Composite instrument identity, the cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub segment: String,
    pub security_id: String,
}

impl InstrumentKey {
    pub fn new(segment: impl Into<String>, security_id: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            security_id: security_id.into(),
        }
    }

    /// Key of the instrument a tracker trades
    pub fn for_tracker(tracker: &Tracker) -> Self {
        Self::new(tracker.segment.clone(), tracker.security_id.clone())
    }
}

impl std::fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.segment, self.security_id)
    }
}

/// Live state of one open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Owning tracker identity
    pub tracker_id: TrackerId,
    pub security_id: String,
    pub segment: String,
    /// Average entry fill price, always positive
    pub entry_price: Decimal,
    /// Signed quantity, positive = long
    pub quantity: i64,
    /// Active stop-loss price
    pub sl_price: Option<Decimal>,
    /// Active take-profit price
    pub tp_price: Option<Decimal>,
    /// Last traded price, None until the first tick arrives
    pub current_ltp: Option<Decimal>,
    /// Open PnL in currency
    pub pnl: Decimal,
    /// Open PnL as a percentage of entry price
    pub pnl_pct: Decimal,
    /// Highest currency PnL ever observed, non-decreasing
    pub high_water_mark: Decimal,
    /// Highest PnL percentage ever observed, non-decreasing
    pub peak_profit_pct: Decimal,
    /// One-way flag: stop locked at no worse than entry
    pub breakeven_locked: bool,
    /// Currency trailing stop reference price
    pub trailing_stop_price: Option<Decimal>,
    /// Timestamp of the last applied tick
    pub last_updated_at: DateTime<Utc>,
    /// Whether the most recent applied tick raised the peak; not persisted
    #[serde(skip)]
    pub peak_advanced: bool,
}

impl PositionSnapshot {
    /// Build the initial snapshot for an active tracker
    ///
    /// PnL fields start at zero; high water mark, breakeven flag and
    /// trailing stop are seeded from the persisted tracker record so a
    /// restart does not forget tightening already won. When no explicit
    /// stop is given, the persisted trailing stop becomes the active one.
    pub fn from_tracker(
        tracker: &Tracker,
        sl_price: Option<Decimal>,
        tp_price: Option<Decimal>,
    ) -> Self {
        Self {
            tracker_id: tracker.id,
            security_id: tracker.security_id.clone(),
            segment: tracker.segment.clone(),
            entry_price: tracker.entry_price,
            quantity: tracker.quantity,
            sl_price: sl_price.or(tracker.trailing_stop_price),
            tp_price,
            current_ltp: None,
            pnl: Decimal::ZERO,
            pnl_pct: Decimal::ZERO,
            high_water_mark: tracker.high_water_mark_pnl,
            peak_profit_pct: Decimal::ZERO,
            breakeven_locked: tracker.breakeven_locked,
            trailing_stop_price: tracker.trailing_stop_price,
            last_updated_at: Utc::now(),
            peak_advanced: false,
        }
    }

    /// Cache key for this snapshot
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.segment.clone(), self.security_id.clone())
    }

    /// Total entry cost, signed (negative for shorts)
    pub fn entry_cost(&self) -> Decimal {
        self.entry_price * Decimal::from(self.quantity)
    }

    /// True when the snapshot has usable pricing fields
    pub fn is_valid(&self) -> bool {
        self.entry_price > Decimal::ZERO && self.quantity != 0
    }

    /// True for a long position
    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    /// Apply a traded price: recompute PnL and raise the running maxima
    ///
    /// Returns true when `peak_profit_pct` advanced, also recorded on
    /// `peak_advanced`. A tick that merely re-touches the prior peak is
    /// not an advance.
    pub(crate) fn apply_ltp(&mut self, ltp: Decimal, at: DateTime<Utc>) -> bool {
        self.current_ltp = Some(ltp);
        self.last_updated_at = at;
        self.pnl = (ltp - self.entry_price) * Decimal::from(self.quantity);
        self.pnl_pct = (ltp - self.entry_price) / self.entry_price * dec!(100);
        if self.pnl > self.high_water_mark {
            self.high_water_mark = self.pnl;
        }
        self.peak_advanced = self.pnl_pct > self.peak_profit_pct;
        if self.peak_advanced {
            self.peak_profit_pct = self.pnl_pct;
        }
        self.peak_advanced
    }

    /// Monotone merge of a recovered peak value
    ///
    /// Returns true when the stored value advanced the snapshot.
    pub(crate) fn merge_peak(&mut self, stored_peak: Decimal) -> bool {
        if stored_peak > Decimal::ZERO && stored_peak > self.peak_profit_pct {
            self.peak_profit_pct = stored_peak;
            true
        } else {
            false
        }
    }
}

/// Typed partial update against one snapshot
///
/// Unset fields are left untouched. Monotonicity is enforced on apply:
/// the peak only merges upward and the breakeven flag never clears.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPatch {
    pub sl_price: Option<Decimal>,
    pub trailing_stop_price: Option<Decimal>,
    pub breakeven_locked: Option<bool>,
    pub peak_profit_pct: Option<Decimal>,
}

impl SnapshotPatch {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.sl_price.is_none()
            && self.trailing_stop_price.is_none()
            && self.breakeven_locked.is_none()
            && self.peak_profit_pct.is_none()
    }
}
