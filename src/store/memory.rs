// In-Memory Store

use crate::error::BeaconResult;
use crate::fetch::FetchKey;
use crate::store::{CandleStore, FetchSetStore, Upsert};
use crate::timeframe::Timeframe;
use crate::types::Candle;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

type CandleKey = (String, String, String, i64);

/// Map-backed store used by tests and as a dependency-free default.
///
/// Candles live in an ordered map keyed by the full candle key, so range
/// queries are a straight ordered scan of one feed's keyspace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    candles: RwLock<BTreeMap<CandleKey, Candle>>,
    fetch_set: RwLock<BTreeSet<FetchKey>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored candles across all feeds
    pub async fn candle_count(&self) -> usize {
        self.candles.read().await.len()
    }
}

fn candle_key(candle: &Candle) -> CandleKey {
    (
        candle.exchange.clone(),
        candle.symbol.clone(),
        candle.timeframe.as_str().to_string(),
        candle.timestamp,
    )
}

#[async_trait]
impl CandleStore for MemoryStore {
    async fn upsert_candle(&self, candle: &Candle) -> BeaconResult<Upsert> {
        let mut candles = self.candles.write().await;
        let key = candle_key(candle);
        if candles.contains_key(&key) {
            return Ok(Upsert::Duplicate);
        }
        candles.insert(key, candle.clone());
        Ok(Upsert::Inserted)
    }

    async fn query_range(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: &Timeframe,
        from_ts: i64,
        to_ts: i64,
    ) -> BeaconResult<Vec<Candle>> {
        let candles = self.candles.read().await;
        let low = (
            exchange.to_string(),
            symbol.to_string(),
            timeframe.as_str().to_string(),
            from_ts,
        );
        let high = (
            exchange.to_string(),
            symbol.to_string(),
            timeframe.as_str().to_string(),
            to_ts,
        );
        Ok(candles
            .range(low..high)
            .map(|(_, candle)| candle.clone())
            .collect())
    }
}

#[async_trait]
impl FetchSetStore for MemoryStore {
    async fn fetch_set(&self) -> BeaconResult<Vec<FetchKey>> {
        Ok(self.fetch_set.read().await.iter().cloned().collect())
    }

    async fn add(&self, key: &FetchKey) -> BeaconResult<bool> {
        // Insert under the write lock, so concurrent registrations of
        // different triples cannot lose each other and at most one caller
        // observes `true` for the same triple.
        Ok(self.fetch_set.write().await.insert(key.clone()))
    }
}
