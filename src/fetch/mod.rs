// Fetch Scheduler
// "One runner per route, and no route runs twice"

pub mod retry;

pub use retry::RetryPolicy;

use crate::error::BeaconResult;
use crate::exchange::{ExchangeClient, ExchangeRegistry};
use crate::store::{CandleStore, FetchSetStore, Upsert};
use crate::stream_id::{StreamId, StreamRequest};
use crate::streams::StreamRegistry;
use crate::timeframe::Timeframe;
use crate::types::{current_timestamp_millis, DataPoint};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// One fetchable feed: exchange, symbol and bar duration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FetchKey {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl FetchKey {
    pub fn new(exchange: &str, symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe,
        }
    }

    /// The raw stream identifier this feed publishes under
    pub fn stream_id(&self) -> StreamId {
        StreamRequest::ohlcv(&self.exchange, &self.symbol, &self.timeframe).stream_id()
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.exchange, self.symbol, self.timeframe)
    }
}

/// Tuning for every fetch task
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Where historical backfill starts, milliseconds since epoch
    pub backfill_epoch_ms: i64,
    /// Fraction of the timeframe to sleep between live polls. Slightly under
    /// one so the next bar close is never missed by a full interval when
    /// clocks disagree.
    pub poll_factor: f64,
    /// Applied around every exchange call
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            // 2017-01-01T00:00:00Z, about as far back as the exchanges serve
            backfill_epoch_ms: 1_483_228_800_000,
            poll_factor: 0.9,
            retry: RetryPolicy::unbounded(Duration::from_secs(1)),
        }
    }
}

/// Starts and tracks one fetch task per registered feed.
///
/// Registration is idempotent at two layers: the persisted fetch set
/// de-duplicates triples across restarts, and the task map de-duplicates
/// live tasks within the process. Clones share state.
#[derive(Clone)]
pub struct FetchScheduler {
    store: Arc<dyn CandleStore>,
    fetch_set: Arc<dyn FetchSetStore>,
    exchanges: Arc<ExchangeRegistry>,
    registry: StreamRegistry,
    options: FetchOptions,
    tasks: Arc<DashMap<FetchKey, JoinHandle<()>>>,
}

impl FetchScheduler {
    pub fn new(
        store: Arc<dyn CandleStore>,
        fetch_set: Arc<dyn FetchSetStore>,
        exchanges: Arc<ExchangeRegistry>,
        registry: StreamRegistry,
        options: FetchOptions,
    ) -> Self {
        Self {
            store,
            fetch_set,
            exchanges,
            registry,
            options,
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Start one fetch task per entry in the persisted fetch set.
    ///
    /// Entries naming an unconfigured exchange are skipped with a warning;
    /// the set itself is returned untouched.
    pub async fn start_all(&self) -> BeaconResult<Vec<FetchKey>> {
        let keys = self.fetch_set.fetch_set().await?;
        info!(feeds = keys.len(), "starting fetch tasks from persisted set");
        for key in &keys {
            self.spawn(key.clone());
        }
        Ok(keys)
    }

    /// Register a feed and start fetching it.
    ///
    /// Idempotent: re-adding an already-registered triple neither duplicates
    /// the persisted entry nor starts a second task. Returns the full fetch
    /// set after the addition.
    pub async fn add(&self, key: FetchKey) -> BeaconResult<Vec<FetchKey>> {
        // Reject unknown exchanges before anything is persisted or spawned.
        self.exchanges.get(&key.exchange)?;

        if self.fetch_set.add(&key).await? {
            info!(feed = %key, "registered new feed");
        }
        self.spawn(key);
        self.fetch_set.fetch_set().await
    }

    /// The persisted fetch set, without touching any task
    pub async fn fetch_set(&self) -> BeaconResult<Vec<FetchKey>> {
        self.fetch_set.fetch_set().await
    }

    /// Number of live fetch tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Start a task for `key` unless one is already running.
    ///
    /// The map entry is claimed before the task spawns, so concurrent
    /// registrations of the same triple resolve to a single task.
    fn spawn(&self, key: FetchKey) {
        match self.tasks.entry(key.clone()) {
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                let client = match self.exchanges.get(&key.exchange) {
                    Ok(client) => client,
                    Err(e) => {
                        warn!(feed = %key, error = %e, "cannot start fetch task");
                        return;
                    }
                };

                let task = FetchTask {
                    stream_id: key.stream_id(),
                    key,
                    client,
                    store: Arc::clone(&self.store),
                    registry: self.registry.clone(),
                    options: self.options.clone(),
                };
                slot.insert(tokio::spawn(task.run()));
            }
        }
    }
}

/// State for one running fetcher
struct FetchTask {
    key: FetchKey,
    stream_id: StreamId,
    client: Arc<dyn ExchangeClient>,
    store: Arc<dyn CandleStore>,
    registry: StreamRegistry,
    options: FetchOptions,
}

impl FetchTask {
    /// Backfill history, then poll forever. The transition is one-way; a
    /// task never re-enters backfill within its lifetime.
    async fn run(self) {
        info!(feed = %self.key, "fetch task started");
        match self.backfill().await {
            Ok(cursor) => self.poll(cursor).await,
            Err(e) => {
                // Non-retryable or out of attempts. No supervisor restarts
                // this task; the feed stays dark until the process restarts.
                error!(feed = %self.key, error = %e, "fetch task aborted during backfill");
            }
        }
    }

    /// Page forward from the backfill epoch until the frontier reaches now
    /// minus one fetch interval. Returns the polling cursor: the timestamp
    /// of the most recent candle seen, or the epoch when history was empty.
    async fn backfill(&self) -> BeaconResult<i64> {
        let bar_ms = self.key.timeframe.as_millis();
        let page_limit = self.client.max_candles_per_request();
        let mut since = self.options.backfill_epoch_ms;
        let mut cursor = since;
        let mut inserted: u64 = 0;
        let mut duplicates: u64 = 0;

        loop {
            if since >= current_timestamp_millis() - self.fetch_interval_ms() {
                break;
            }

            let page = self.fetch_page(since, page_limit).await?;
            if page.is_empty() {
                // The exchange has nothing further; the frontier is as close
                // to now as history allows.
                break;
            }

            let mut page_max = since;
            for candle in &page {
                match self.store.upsert_candle(candle).await {
                    Ok(Upsert::Inserted) => inserted += 1,
                    Ok(Upsert::Duplicate) => duplicates += 1,
                    Err(e) => {
                        // One bad write does not sink the page; move on to
                        // the next candle.
                        warn!(feed = %self.key, error = %e, "backfill upsert failed");
                    }
                }
                cursor = cursor.max(candle.timestamp);
                page_max = page_max.max(candle.timestamp);
            }
            since = page_max + bar_ms;
        }

        info!(
            feed = %self.key,
            inserted,
            duplicates,
            cursor,
            "backfill complete, switching to polling"
        );
        Ok(cursor)
    }

    /// Steady-state live polling. Only freshly inserted candles are
    /// published; duplicates advance nothing but the cursor.
    async fn poll(&self, mut cursor: i64) {
        let page_limit = self.client.max_candles_per_request();
        let sleep_interval = Duration::from_millis(self.fetch_interval_ms() as u64);

        loop {
            let page = match self.fetch_page(cursor, page_limit).await {
                Ok(page) => page,
                Err(e) => {
                    error!(feed = %self.key, error = %e, "fetch task aborted during polling");
                    return;
                }
            };

            for candle in &page {
                match self.store.upsert_candle(candle).await {
                    Ok(Upsert::Inserted) => {
                        self.registry
                            .publish(&self.stream_id, DataPoint::from_candle(candle));
                        cursor = cursor.max(candle.timestamp);
                    }
                    Ok(Upsert::Duplicate) => {
                        cursor = cursor.max(candle.timestamp);
                    }
                    Err(e) => {
                        warn!(feed = %self.key, error = %e, "poll upsert failed");
                    }
                }
            }

            // An empty page sleeps too, without advancing the cursor.
            tokio::time::sleep(sleep_interval).await;
        }
    }

    /// One exchange call under the retry policy
    async fn fetch_page(&self, since: i64, limit: usize) -> BeaconResult<Vec<crate::types::Candle>> {
        self.options
            .retry
            .run("fetch_candles", || {
                let client = Arc::clone(&self.client);
                let symbol = self.key.symbol.clone();
                let timeframe = self.key.timeframe.clone();
                async move { client.fetch_candles(&symbol, &timeframe, since, limit).await }
            })
            .await
    }

    fn fetch_interval_ms(&self) -> i64 {
        (self.key.timeframe.as_millis() as f64 * self.options.poll_factor) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_key_display_and_stream_id() {
        let key = FetchKey::new("binance", "BTC/USDT", Timeframe::parse("1m").unwrap());
        assert_eq!(key.to_string(), "binance:BTC/USDT:1m");
        assert_eq!(key.stream_id().as_str(), "ohlcv_binance_BTC/USDT_1m");
    }

    #[test]
    fn default_options_poll_slightly_early() {
        let options = FetchOptions::default();
        assert!(options.poll_factor < 1.0);
        assert!(options.retry.max_attempts().is_none());
    }
}
