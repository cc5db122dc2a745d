//! Tick types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cache::InstrumentKey;

/// A single price tick for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    /// Exchange segment (e.g. "NSE_FNO")
    pub segment: String,
    /// Exchange security identifier
    pub security_id: String,
    /// Last traded price
    pub ltp: Decimal,
    /// When the exchange produced the tick
    pub ts: DateTime<Utc>,
}

impl Tick {
    /// Cache key for the instrument this tick prices
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.segment.clone(), self.security_id.clone())
    }
}
