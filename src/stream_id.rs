// Stream Identifiers
// "Every signal gets one name, no matter who asks for it"

use crate::error::{BeaconError, BeaconResult};
use crate::timeframe::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The kinds of data feeds a client can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Raw candles produced by a fetcher
    Ohlcv,
    /// Exponential moving average derived from a raw stream
    Ema,
    /// MACD derived from a raw stream
    Macd,
}

impl ResourceKind {
    /// Parse a resource kind, rejecting anything outside the known set
    pub fn parse(resource: &str) -> BeaconResult<Self> {
        match resource {
            "ohlcv" => Ok(Self::Ohlcv),
            "ema" => Ok(Self::Ema),
            "macd" => Ok(Self::Macd),
            _ => Err(BeaconError::unknown_resource(resource)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ohlcv => "ohlcv",
            Self::Ema => "ema",
            Self::Macd => "macd",
        }
    }

    /// Whether this kind is computed from a prerequisite raw stream
    pub fn is_transformed(&self) -> bool {
        matches!(self, Self::Ema | Self::Macd)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical key naming one live or queryable data feed.
///
/// A pure function of (resource kind, parameter set): the resource name
/// followed by every parameter value in key-sorted order. Two requests with
/// the same kind and parameters map to the same identifier regardless of how
/// the caller ordered the parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated request for one stream: the resource kind plus its parameters.
///
/// Construction is the single validation point; once a `StreamRequest`
/// exists, its identifier and typed parameter accessors cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    kind: ResourceKind,
    params: BTreeMap<String, String>,
}

impl StreamRequest {
    /// Validate a resource name and parameter map into a stream request.
    ///
    /// All kinds require `exchange`, `symbol` and a parseable `timeframe`;
    /// `ema` additionally requires `ema_samples`, `macd` requires `ema_fast`
    /// and `ema_slow`.
    pub fn new(resource: &str, params: BTreeMap<String, String>) -> BeaconResult<Self> {
        let kind = ResourceKind::parse(resource)?;
        let request = Self { kind, params };

        request.require("exchange")?;
        request.require("symbol")?;
        Timeframe::parse(request.require("timeframe")?)?;

        match kind {
            ResourceKind::Ohlcv => {}
            ResourceKind::Ema => {
                request.require_window("ema_samples")?;
            }
            ResourceKind::Macd => {
                request.require_window("ema_fast")?;
                request.require_window("ema_slow")?;
            }
        }

        Ok(request)
    }

    /// Build a request from the JSON parameter object of an API call.
    ///
    /// Number and string values are both accepted; each is canonicalized to
    /// its string form before entering the identifier.
    pub fn from_json(
        resource: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> BeaconResult<Self> {
        let mut canonical = BTreeMap::new();
        for (key, value) in params {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(BeaconError::invalid_stream_id(format!(
                        "parameter '{key}' has unsupported type: {other}"
                    )))
                }
            };
            canonical.insert(key.clone(), rendered);
        }
        Self::new(resource, canonical)
    }

    /// Raw candle stream request
    pub fn ohlcv(exchange: &str, symbol: &str, timeframe: &Timeframe) -> Self {
        let mut params = BTreeMap::new();
        params.insert("exchange".to_string(), exchange.to_string());
        params.insert("symbol".to_string(), symbol.to_string());
        params.insert("timeframe".to_string(), timeframe.as_str().to_string());
        Self {
            kind: ResourceKind::Ohlcv,
            params,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The canonical identifier for this request
    pub fn stream_id(&self) -> StreamId {
        let mut id = self.kind.as_str().to_string();
        for value in self.params.values() {
            id.push('_');
            id.push_str(value);
        }
        StreamId(id)
    }

    /// The raw stream this transformed request consumes.
    ///
    /// For an already-raw request this is the request itself.
    pub fn raw_prerequisite(&self) -> Self {
        Self::ohlcv(self.exchange(), self.symbol(), &self.timeframe())
    }

    pub fn exchange(&self) -> &str {
        self.params.get("exchange").map(String::as_str).unwrap_or("")
    }

    pub fn symbol(&self) -> &str {
        self.params.get("symbol").map(String::as_str).unwrap_or("")
    }

    /// The validated timeframe of this request
    pub fn timeframe(&self) -> Timeframe {
        // Parse-checked in `new`
        Timeframe::parse(self.params.get("timeframe").map(String::as_str).unwrap_or(""))
            .expect("timeframe validated at construction")
    }

    /// A validated window parameter such as `ema_samples` or `ema_fast`
    pub fn window(&self, key: &str) -> usize {
        self.params
            .get(key)
            .and_then(|v| v.parse().ok())
            .expect("window parameter validated at construction")
    }

    fn require(&self, key: &str) -> BeaconResult<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| BeaconError::invalid_stream_id(format!("missing parameter '{key}'")))
    }

    fn require_window(&self, key: &str) -> BeaconResult<usize> {
        let raw = self.require(key)?;
        let window: usize = raw.parse().map_err(|_| {
            BeaconError::invalid_stream_id(format!("parameter '{key}' is not a positive integer"))
        })?;
        if window == 0 {
            return Err(BeaconError::invalid_stream_id(format!(
                "parameter '{key}' must be at least 1"
            )));
        }
        Ok(window)
    }
}
