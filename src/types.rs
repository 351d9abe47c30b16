// Core Types and Data Structures

use crate::indicators::MacdPoint;
use crate::timeframe::Timeframe;
use serde::{Deserialize, Serialize};

/// One fixed-duration aggregated price/volume bar.
///
/// Uniquely identified by (exchange, symbol, timeframe, timestamp); the
/// timestamp is the bar open time in milliseconds since epoch, aligned to the
/// timeframe boundary. Candles are immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// The price/volume payload without the identifying key fields
    pub fn bar(&self) -> OhlcvBar {
        OhlcvBar {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Price/volume payload of a candle as it travels over a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// MACD payload as it travels over a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdBar {
    pub macd: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub cross: bool,
    pub rising: bool,
}

impl From<MacdPoint> for MacdBar {
    fn from(point: MacdPoint) -> Self {
        Self {
            macd: point.macd,
            ema_fast: point.ema_fast,
            ema_slow: point.ema_slow,
            cross: point.cross,
            rising: point.rising,
        }
    }
}

/// One published data point on a stream.
///
/// Serializes to a single self-delimiting JSON object; subscribers receive
/// these back-to-back with no additional framing. Variant order matters for
/// deserialization: the MACD record is a superset of the OHLCV record, so it
/// must be tried first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPoint {
    Macd {
        timestamp: i64,
        macd: MacdBar,
        ohlcv: OhlcvBar,
    },
    Ohlcv {
        timestamp: i64,
        ohlcv: OhlcvBar,
    },
    Ema {
        timestamp: i64,
        ema: f64,
    },
}

impl DataPoint {
    /// Build the raw-stream record for a freshly ingested candle
    pub fn from_candle(candle: &Candle) -> Self {
        Self::Ohlcv {
            timestamp: candle.timestamp,
            ohlcv: candle.bar(),
        }
    }

    /// Bar open time of this data point
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Macd { timestamp, .. }
            | Self::Ohlcv { timestamp, .. }
            | Self::Ema { timestamp, .. } => *timestamp,
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
