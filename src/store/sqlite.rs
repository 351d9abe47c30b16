// SQLite Store

use crate::error::{BeaconError, BeaconResult};
use crate::fetch::FetchKey;
use crate::store::{CandleStore, FetchSetStore, Upsert};
use crate::timeframe::Timeframe;
use crate::types::Candle;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

/// SQLite-backed store.
///
/// The candle primary key carries the idempotency contract: `INSERT OR
/// IGNORE` turns a duplicate insert into a zero-row write, which surfaces as
/// `Upsert::Duplicate`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    ///
    /// `url` uses sqlx form, e.g. `sqlite://beacon.db`.
    pub async fn connect(url: &str) -> BeaconResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "sqlite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> BeaconResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS candles (
                exchange   TEXT NOT NULL,
                symbol     TEXT NOT NULL,
                timeframe  TEXT NOT NULL,
                timestamp  INTEGER NOT NULL,
                open       REAL NOT NULL,
                high       REAL NOT NULL,
                low        REAL NOT NULL,
                close      REAL NOT NULL,
                volume     REAL NOT NULL,
                PRIMARY KEY (exchange, symbol, timeframe, timestamp)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS fetch_set (
                exchange   TEXT NOT NULL,
                symbol     TEXT NOT NULL,
                timeframe  TEXT NOT NULL,
                PRIMARY KEY (exchange, symbol, timeframe)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CandleStore for SqliteStore {
    async fn upsert_candle(&self, candle: &Candle) -> BeaconResult<Upsert> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO candles
                (exchange, symbol, timeframe, timestamp, open, high, low, close, volume)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&candle.exchange)
        .bind(&candle.symbol)
        .bind(candle.timeframe.as_str())
        .bind(candle.timestamp)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(Upsert::Duplicate)
        } else {
            Ok(Upsert::Inserted)
        }
    }

    async fn query_range(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: &Timeframe,
        from_ts: i64,
        to_ts: i64,
    ) -> BeaconResult<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT timestamp, open, high, low, close, volume
             FROM candles
             WHERE exchange = ? AND symbol = ? AND timeframe = ?
               AND timestamp >= ? AND timestamp < ?
             ORDER BY timestamp ASC",
        )
        .bind(exchange)
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Candle {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                timeframe: timeframe.clone(),
                timestamp: row.get("timestamp"),
                open: row.get("open"),
                high: row.get("high"),
                low: row.get("low"),
                close: row.get("close"),
                volume: row.get("volume"),
            })
            .collect())
    }
}

#[async_trait]
impl FetchSetStore for SqliteStore {
    async fn fetch_set(&self) -> BeaconResult<Vec<FetchKey>> {
        let rows = sqlx::query(
            "SELECT exchange, symbol, timeframe FROM fetch_set
             ORDER BY exchange, symbol, timeframe",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let timeframe: String = row.get("timeframe");
                let timeframe = Timeframe::parse(&timeframe).map_err(|_| {
                    BeaconError::store(format!("corrupt timeframe in fetch_set: {timeframe}"))
                })?;
                Ok(FetchKey {
                    exchange: row.get("exchange"),
                    symbol: row.get("symbol"),
                    timeframe,
                })
            })
            .collect()
    }

    async fn add(&self, key: &FetchKey) -> BeaconResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO fetch_set (exchange, symbol, timeframe) VALUES (?, ?, ?)",
        )
        .bind(&key.exchange)
        .bind(&key.symbol)
        .bind(key.timeframe.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
