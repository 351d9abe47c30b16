// Candle Store and Fetch-Set Persistence
// "The archive does not care how many times you hand it the same page"

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::BeaconResult;
use crate::fetch::FetchKey;
use crate::timeframe::Timeframe;
use crate::types::Candle;
use async_trait::async_trait;

/// Outcome of an idempotent candle insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The candle was not present and is now stored
    Inserted,
    /// A candle with the same key already exists; the store is unchanged
    Duplicate,
}

/// Durable, append-only candle storage keyed by
/// (exchange, symbol, timeframe, timestamp).
///
/// The engine treats the store as an opaque time-ordered keyed collection;
/// implementations decide how the bytes land on disk.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Insert a candle if its key is absent. Re-inserting an existing key is
    /// a no-op reported as `Duplicate`, never an error and never an
    /// overwrite.
    async fn upsert_candle(&self, candle: &Candle) -> BeaconResult<Upsert>;

    /// All candles for one feed with `from_ts <= timestamp < to_ts`,
    /// ascending by timestamp.
    async fn query_range(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: &Timeframe,
        from_ts: i64,
        to_ts: i64,
    ) -> BeaconResult<Vec<Candle>>;
}

/// Persistence for the set of (exchange, symbol, timeframe) triples being
/// fetched, so a restarted process resumes the same set.
#[async_trait]
pub trait FetchSetStore: Send + Sync {
    /// The currently registered fetch set
    async fn fetch_set(&self) -> BeaconResult<Vec<FetchKey>>;

    /// Register a triple. Returns `true` when the triple was newly added,
    /// `false` when it was already present. Concurrent additions of
    /// different triples must not lose each other.
    async fn add(&self, key: &FetchKey) -> BeaconResult<bool>;
}
