// Derived-Stream Computation Tasks

use crate::indicators::{EmaAccumulator, MacdAccumulator};
use crate::stream_id::StreamId;
use crate::streams::StreamRegistry;
use crate::types::DataPoint;
use tokio::sync::mpsc;
use tracing::debug;

/// Consume a raw candle stream and republish the running EMA of its closes.
///
/// The prerequisite channel is consumed strictly in publication order; the
/// incremental recurrence depends on it.
pub(crate) async fn run_ema(
    registry: StreamRegistry,
    stream_id: StreamId,
    mut raw: mpsc::UnboundedReceiver<DataPoint>,
    mut accumulator: EmaAccumulator,
) {
    while let Some(point) = raw.recv().await {
        let DataPoint::Ohlcv { timestamp, ohlcv } = point else {
            continue;
        };
        let ema = accumulator.tick(ohlcv.close);
        registry.publish(&stream_id, DataPoint::Ema { timestamp, ema });
    }
    debug!(stream = %stream_id, "prerequisite channel closed, ema task ending");
}

/// Consume a raw candle stream and republish MACD ticks over its closes.
pub(crate) async fn run_macd(
    registry: StreamRegistry,
    stream_id: StreamId,
    mut raw: mpsc::UnboundedReceiver<DataPoint>,
    mut accumulator: MacdAccumulator,
) {
    while let Some(point) = raw.recv().await {
        let DataPoint::Ohlcv { timestamp, ohlcv } = point else {
            continue;
        };
        let macd = accumulator.tick(ohlcv.close);
        registry.publish(
            &stream_id,
            DataPoint::Macd {
                timestamp,
                macd: macd.into(),
                ohlcv,
            },
        );
    }
    debug!(stream = %stream_id, "prerequisite channel closed, macd task ending");
}
