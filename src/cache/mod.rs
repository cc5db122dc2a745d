//! In-memory position cache
//!
//! Authoritative runtime view of every open position, rebuilt from the
//! tracker store on startup and advanced tick by tick. Snapshots are keyed
//! by instrument so the tick path and the periodic sweep can read and write
//! concurrently without a global lock.

mod recovery;
mod snapshot;
mod store;
mod types;

pub use recovery::{recover, reconcile_peaks, PeakReconciliation};
pub use snapshot::{InstrumentKey, PositionSnapshot, SnapshotPatch};
pub use store::PositionCache;
pub use types::CacheError;
