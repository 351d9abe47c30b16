// Binance REST Client

use crate::error::{BeaconError, BeaconResult};
use crate::exchange::ExchangeClient;
use crate::timeframe::Timeframe;
use crate::types::Candle;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const EXCHANGE_NAME: &str = "binance";
const DEFAULT_BASE_URL: &str = "https://api.binance.com";
// Binance serves at most 1000 klines per request.
const MAX_CANDLES_PER_REQUEST: usize = 1000;

/// Candle fetcher over the public Binance kline endpoint.
///
/// Only the unauthenticated market-data surface is used, so no API keys or
/// request signing are involved.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at a different host, e.g. a local stub in tests
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client construction only fails on TLS backend misconfiguration");

        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Binance spells symbols without the slash separator ("BTCUSDT")
    fn wire_symbol(symbol: &str) -> String {
        symbol.replace('/', "")
    }

    fn parse_kline(symbol: &str, timeframe: &Timeframe, row: &Value) -> BeaconResult<Candle> {
        let fields = row
            .as_array()
            .filter(|fields| fields.len() >= 6)
            .ok_or_else(|| {
                BeaconError::exchange_transient(EXCHANGE_NAME, "malformed kline row")
            })?;

        let timestamp = fields[0].as_i64().ok_or_else(|| {
            BeaconError::exchange_transient(EXCHANGE_NAME, "kline open time is not an integer")
        })?;

        let price = |index: usize| -> BeaconResult<f64> {
            fields[index]
                .as_str()
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| {
                    BeaconError::exchange_transient(
                        EXCHANGE_NAME,
                        format!("kline field {index} is not a decimal string"),
                    )
                })
        };

        Ok(Candle {
            exchange: EXCHANGE_NAME.to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.clone(),
            timestamp,
            open: price(1)?,
            high: price(2)?,
            low: price(3)?,
            close: price(4)?,
            volume: price(5)?,
        })
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        EXCHANGE_NAME
    }

    fn max_candles_per_request(&self) -> usize {
        MAX_CANDLES_PER_REQUEST
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> BeaconResult<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&limit={}",
            self.base_url,
            Self::wire_symbol(symbol),
            timeframe.as_str(),
            since_ms,
            limit.min(MAX_CANDLES_PER_REQUEST),
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BeaconError::exchange_transient(EXCHANGE_NAME, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Rate limits and server hiccups land here; both are transient.
            let body = response.text().await.unwrap_or_default();
            return Err(BeaconError::exchange_transient(
                EXCHANGE_NAME,
                format!("klines request returned {status}: {body}"),
            ));
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| BeaconError::exchange_transient(EXCHANGE_NAME, e.to_string()))?;

        let candles = rows
            .iter()
            .map(|row| Self::parse_kline(symbol, timeframe, row))
            .collect::<BeaconResult<Vec<_>>>()?;

        debug!(
            symbol,
            timeframe = timeframe.as_str(),
            since_ms,
            count = candles.len(),
            "fetched klines"
        );
        Ok(candles)
    }
}
