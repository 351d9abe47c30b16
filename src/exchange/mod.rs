// Exchange Clients

pub mod binance;

pub use binance::BinanceClient;

use crate::error::{BeaconError, BeaconResult};
use crate::timeframe::Timeframe;
use crate::types::Candle;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// A source of historical and live candles for one exchange.
///
/// `fetch_candles` returns candles ascending by timestamp within one page;
/// failures are transient by classification (the caller's retry policy
/// decides how often to come back).
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// The exchange name used in candle keys and stream identifiers
    fn name(&self) -> &str;

    /// The exchange's maximum candles per request, which caps backfill pages
    fn max_candles_per_request(&self) -> usize;

    /// Candles for `symbol`/`timeframe` with timestamp >= `since_ms`, at most
    /// `limit` of them, ascending.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> BeaconResult<Vec<Candle>>;
}

/// Name-to-client lookup for every exchange this process talks to.
///
/// Built once by the composition root; fetch tasks resolve their client here
/// when they start.
#[derive(Default)]
pub struct ExchangeRegistry {
    clients: DashMap<String, Arc<dyn ExchangeClient>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own name, replacing any previous entry
    pub fn register(&self, client: Arc<dyn ExchangeClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    /// Resolve a client by exchange name
    pub fn get(&self, exchange: &str) -> BeaconResult<Arc<dyn ExchangeClient>> {
        self.clients
            .get(exchange)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BeaconError::unknown_exchange(exchange))
    }

    /// Whether an exchange name is known
    pub fn contains(&self, exchange: &str) -> bool {
        self.clients.contains_key(exchange)
    }
}
