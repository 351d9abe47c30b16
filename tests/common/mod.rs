// Shared test fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use beacon::error::{BeaconError, BeaconResult};
use beacon::exchange::{ExchangeClient, ExchangeRegistry};
use beacon::fetch::{FetchOptions, RetryPolicy};
use beacon::store::MemoryStore;
use beacon::timeframe::Timeframe;
use beacon::types::Candle;
use beacon::DataService;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One recorded `fetch_candles` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCall {
    pub since_ms: i64,
    pub limit: usize,
}

/// An exchange whose responses are scripted call by call.
///
/// Each `fetch_candles` pops the next scripted response; once the script is
/// exhausted every further call returns an empty page. Calls are recorded so
/// tests can assert on the cursor the scheduler passed.
pub struct ScriptedExchange {
    name: String,
    responses: Mutex<VecDeque<BeaconResult<Vec<Candle>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExchange {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_page(&self, candles: Vec<Candle>) {
        self.responses.lock().unwrap().push_back(Ok(candles));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(BeaconError::exchange_transient(&self.name, message)));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_candles_per_request(&self) -> usize {
        1000
    }

    async fn fetch_candles(
        &self,
        _symbol: &str,
        _timeframe: &Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> BeaconResult<Vec<Candle>> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { since_ms, limit });
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(Vec::new()),
        }
    }
}

/// A candle with flat prices at `close`
pub fn candle(
    exchange: &str,
    symbol: &str,
    timeframe: &Timeframe,
    timestamp: i64,
    close: f64,
) -> Candle {
    Candle {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
        timeframe: timeframe.clone(),
        timestamp,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
    }
}

/// Fetch options tuned for tests: epoch zero, bounded retries, no waiting
pub fn test_fetch_options() -> FetchOptions {
    FetchOptions {
        backfill_epoch_ms: 0,
        poll_factor: 0.9,
        retry: RetryPolicy::bounded(5, Duration::ZERO),
    }
}

/// A service over an in-memory store, the given scripted exchanges and
/// OS-assigned subscription ports
pub fn memory_service(
    clients: Vec<Arc<ScriptedExchange>>,
    options: FetchOptions,
) -> (Arc<MemoryStore>, Arc<DataService>) {
    let store = Arc::new(MemoryStore::new());
    let exchanges = Arc::new(ExchangeRegistry::new());
    for client in clients {
        exchanges.register(client);
    }
    let service = Arc::new(DataService::new(
        store.clone(),
        store.clone(),
        exchanges,
        options,
        "127.0.0.1",
        0,
        0,
    ));
    (store, service)
}

/// Poll `probe` every few milliseconds until it returns true or the
/// deadline passes
pub async fn wait_until<F, Fut>(deadline: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let started = std::time::Instant::now();
    while started.elapsed() < deadline {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
