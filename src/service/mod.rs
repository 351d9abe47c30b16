// Data Service
// "The harbor master: everything that docks or departs goes through here"

use crate::error::{BeaconError, BeaconResult};
use crate::exchange::ExchangeRegistry;
use crate::fetch::{FetchKey, FetchOptions, FetchScheduler};
use crate::indicators::{ema_history, macd_history};
use crate::store::{CandleStore, FetchSetStore};
use crate::stream_id::{ResourceKind, StreamId, StreamRequest};
use crate::streams::StreamRegistry;
use crate::timeframe::Timeframe;
use crate::transport::SubscriptionTransport;
use crate::types::{current_timestamp_millis, DataPoint};
use std::net::SocketAddr;
use std::sync::Arc;

/// The composition root of the pipeline.
///
/// Owns the stream registry, fetch scheduler and subscription transport, and
/// exposes the operations the control surface calls. Every collaborator is
/// handed in at construction; nothing reaches for ambient global state.
pub struct DataService {
    store: Arc<dyn CandleStore>,
    registry: StreamRegistry,
    scheduler: FetchScheduler,
    transport: SubscriptionTransport,
}

impl DataService {
    pub fn new(
        store: Arc<dyn CandleStore>,
        fetch_set: Arc<dyn FetchSetStore>,
        exchanges: Arc<ExchangeRegistry>,
        options: FetchOptions,
        host: &str,
        port_base: u16,
        port_limit: u16,
    ) -> Self {
        let registry = StreamRegistry::new(Arc::clone(&store));
        let scheduler = FetchScheduler::new(
            Arc::clone(&store),
            fetch_set,
            exchanges,
            registry.clone(),
            options,
        );
        let transport = SubscriptionTransport::new(registry.clone(), host, port_base, port_limit);

        Self {
            store,
            registry,
            scheduler,
            transport,
        }
    }

    /// The stream registry, for embedding callers and tests
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// The fetch scheduler, for embedding callers and tests
    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    /// Start one fetch task per entry in the persisted fetch set
    pub async fn start_fetch(&self) -> BeaconResult<Vec<FetchKey>> {
        self.scheduler.start_all().await
    }

    /// Register a new feed and start fetching it; idempotent. Returns the
    /// full fetch set.
    pub async fn add_fetch(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
    ) -> BeaconResult<Vec<FetchKey>> {
        self.scheduler
            .add(FetchKey::new(exchange, symbol, timeframe))
            .await
    }

    /// The currently registered fetch set
    pub async fn fetch_set(&self) -> BeaconResult<Vec<FetchKey>> {
        self.scheduler.fetch_set().await
    }

    /// Resolve (creating if needed) the subscription endpoint for a stream.
    ///
    /// For a transformed resource the computation is started here, so an
    /// `InsufficientHistory` failure reaches this caller instead of dying
    /// inside an accept loop. Repeat calls return the same endpoint.
    pub async fn subscribe_add(
        &self,
        request: &StreamRequest,
    ) -> BeaconResult<(StreamId, SocketAddr)> {
        self.registry.ensure_transform(request).await?;
        let addr = self.transport.ensure_endpoint(request).await?;
        Ok((request.stream_id(), addr))
    }

    /// Historical range query, computing derived values on the fly.
    ///
    /// Provided bounds are clipped to timeframe boundaries by truncation
    /// toward zero; a missing `from` means the beginning of time and a
    /// missing `to` means slightly past now. An empty range is
    /// `DataNotAvailable` rather than an empty payload.
    pub async fn get(
        &self,
        request: &StreamRequest,
        from_ts: Option<i64>,
        to_ts: Option<i64>,
    ) -> BeaconResult<Vec<DataPoint>> {
        let timeframe = request.timeframe();
        let from = timeframe.align_down(from_ts.unwrap_or(0));
        let to = to_ts
            .map(|to| timeframe.align_down(to))
            .unwrap_or_else(|| current_timestamp_millis() + 10_000);

        let candles = self
            .store
            .query_range(request.exchange(), request.symbol(), &timeframe, from, to)
            .await?;
        if candles.is_empty() {
            return Err(BeaconError::DataNotAvailable);
        }

        match request.kind() {
            ResourceKind::Ohlcv => Ok(candles.iter().map(DataPoint::from_candle).collect()),
            ResourceKind::Ema => {
                let window = request.window("ema_samples");
                let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                Ok(ema_history(window, &closes)
                    .into_iter()
                    .zip(&candles)
                    .map(|(ema, candle)| DataPoint::Ema {
                        timestamp: candle.timestamp,
                        ema,
                    })
                    .collect())
            }
            ResourceKind::Macd => {
                let fast = request.window("ema_fast");
                let slow = request.window("ema_slow");
                let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                Ok(macd_history(fast, slow, &closes)
                    .into_iter()
                    .zip(&candles)
                    .map(|(point, candle)| DataPoint::Macd {
                        timestamp: candle.timestamp,
                        macd: point.into(),
                        ohlcv: candle.bar(),
                    })
                    .collect())
            }
        }
    }
}
