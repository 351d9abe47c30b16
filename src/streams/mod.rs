// Stream Registry and Fan-out
// "One switchboard, every wire labelled"

pub mod transform;

use crate::error::{BeaconError, BeaconResult};
use crate::indicators::{EmaAccumulator, MacdAccumulator};
use crate::store::CandleStore;
use crate::stream_id::{ResourceKind, StreamId, StreamRequest};
use crate::types::{current_timestamp_millis, DataPoint};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

// Trailing bars queried beyond the seed window during transform warm-up, so
// a feed that is a bar or two behind wall clock still seeds.
const WARMUP_SLACK_BARS: usize = 3;

/// Routes every published data point to the current subscribers of its
/// stream identifier, and lazily starts derived-stream computations.
///
/// Clones share state; hand out clones freely to tasks.
#[derive(Clone)]
pub struct StreamRegistry {
    channels: Arc<DashMap<StreamId, Vec<mpsc::UnboundedSender<DataPoint>>>>,
    transforms: Arc<Mutex<HashSet<StreamId>>>,
    store: Arc<dyn CandleStore>,
}

impl StreamRegistry {
    pub fn new(store: Arc<dyn CandleStore>) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            transforms: Arc::new(Mutex::new(HashSet::new())),
            store,
        }
    }

    /// Deliver a data point to every channel registered under `stream_id`.
    ///
    /// A stream with no subscribers is a no-op. Channels whose receiver has
    /// gone away are pruned here. Per stream, subscribers observe points in
    /// publication order.
    pub fn publish(&self, stream_id: &StreamId, point: DataPoint) {
        let Some(mut senders) = self.channels.get_mut(stream_id) else {
            return;
        };
        senders.retain(|sender| sender.send(point.clone()).is_ok());
    }

    /// Register a new delivery channel under `stream_id` and return its
    /// receiving end. No transform bookkeeping happens here; use
    /// [`StreamRegistry::subscribe`] for that.
    pub fn attach(&self, stream_id: &StreamId) -> mpsc::UnboundedReceiver<DataPoint> {
        // Unbounded delivery queue: a permanently stalled subscriber grows
        // its own queue without limit. Bound it here if that tradeoff ever
        // changes; this is the only construction site.
        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels
            .entry(stream_id.clone())
            .or_default()
            .push(sender);
        receiver
    }

    /// Subscribe to a stream, starting its derived computation if needed.
    ///
    /// For a transformed resource this seeds the computation from stored
    /// history before any live point is consumed; `InsufficientHistory`
    /// surfaces to the caller and nothing is started.
    pub async fn subscribe(
        &self,
        request: &StreamRequest,
    ) -> BeaconResult<mpsc::UnboundedReceiver<DataPoint>> {
        self.ensure_transform(request).await?;
        Ok(self.attach(&request.stream_id()))
    }

    /// Start the computation task for a transformed stream if none runs yet.
    ///
    /// Raw streams pass through untouched. The single-flight guard holds
    /// across warm-up, so two concurrent first subscribers cannot start two
    /// computations for the same identifier.
    pub async fn ensure_transform(&self, request: &StreamRequest) -> BeaconResult<()> {
        if !request.kind().is_transformed() {
            return Ok(());
        }

        let stream_id = request.stream_id();
        let mut running = self.transforms.lock().await;
        if running.contains(&stream_id) {
            return Ok(());
        }

        // Attach to the prerequisite before reading history: points that
        // arrive while we seed wait in the channel instead of being lost.
        let raw_receiver = self.attach(&request.raw_prerequisite().stream_id());

        match request.kind() {
            ResourceKind::Ema => {
                let window = request.window("ema_samples");
                let closes = self.warmup_closes(request, window).await?;
                let accumulator = EmaAccumulator::seed(window, &closes)?;
                tokio::spawn(transform::run_ema(
                    self.clone(),
                    stream_id.clone(),
                    raw_receiver,
                    accumulator,
                ));
            }
            ResourceKind::Macd => {
                let fast = request.window("ema_fast");
                let slow = request.window("ema_slow");
                let closes = self.warmup_closes(request, slow.max(fast)).await?;
                let accumulator = MacdAccumulator::seed(fast, slow, &closes)?;
                tokio::spawn(transform::run_macd(
                    self.clone(),
                    stream_id.clone(),
                    raw_receiver,
                    accumulator,
                ));
            }
            ResourceKind::Ohlcv => unreachable!("raw streams are not transformed"),
        }

        info!(stream = %stream_id, "derived stream computation started");
        running.insert(stream_id);
        Ok(())
    }

    /// Trailing close prices for seeding a transform, newest last.
    ///
    /// Queries `window` bars plus slack back from now and fails with
    /// `InsufficientHistory` when the store cannot cover the seed window.
    async fn warmup_closes(
        &self,
        request: &StreamRequest,
        window: usize,
    ) -> BeaconResult<Vec<f64>> {
        let timeframe = request.timeframe();
        let now = current_timestamp_millis();
        let from = now - ((window + WARMUP_SLACK_BARS) as i64) * timeframe.as_millis();
        let to = now + 10_000;

        let candles = self
            .store
            .query_range(request.exchange(), request.symbol(), &timeframe, from, to)
            .await?;

        if candles.len() < window {
            debug!(
                stream = %request.stream_id(),
                needed = window,
                available = candles.len(),
                "not enough stored history to seed transform"
            );
            return Err(BeaconError::insufficient_history(window, candles.len()));
        }
        Ok(candles.iter().map(|candle| candle.close).collect())
    }

    /// Number of live channels registered under `stream_id`
    pub fn subscriber_count(&self, stream_id: &StreamId) -> usize {
        self.channels
            .get(stream_id)
            .map(|senders| senders.len())
            .unwrap_or(0)
    }

    /// Whether a computation task runs for `stream_id`
    pub async fn transform_running(&self, stream_id: &StreamId) -> bool {
        self.transforms.lock().await.contains(stream_id)
    }
}
