// SQLite store contract tests

mod common;

use common::candle;

use beacon::fetch::FetchKey;
use beacon::store::{CandleStore, FetchSetStore, SqliteStore, Upsert};
use beacon::timeframe::Timeframe;
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> SqliteStore {
    let path = dir.path().join("beacon-test.db");
    let url = format!("sqlite://{}", path.display());
    SqliteStore::connect(&url).await.unwrap()
}

#[tokio::test]
async fn upsert_is_idempotent_and_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let timeframe = Timeframe::parse("1m").unwrap();
    let bar = candle("binance", "BTC/USDT", &timeframe, 60_000, 100.0);

    assert_eq!(store.upsert_candle(&bar).await.unwrap(), Upsert::Inserted);
    assert_eq!(store.upsert_candle(&bar).await.unwrap(), Upsert::Duplicate);

    let mut revised = bar.clone();
    revised.close = 999.0;
    assert_eq!(
        store.upsert_candle(&revised).await.unwrap(),
        Upsert::Duplicate
    );

    let stored = store
        .query_range("binance", "BTC/USDT", &timeframe, 0, 120_000)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].close, 100.0);
}

#[tokio::test]
async fn range_query_is_ordered_and_half_open() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let timeframe = Timeframe::parse("1m").unwrap();

    for (ts, close) in [(180_000, 3.0), (60_000, 1.0), (120_000, 2.0)] {
        store
            .upsert_candle(&candle("binance", "BTC/USDT", &timeframe, ts, close))
            .await
            .unwrap();
    }

    let range = store
        .query_range("binance", "BTC/USDT", &timeframe, 60_000, 180_000)
        .await
        .unwrap();
    let timestamps: Vec<i64> = range.iter().map(|c| c.timestamp).collect();
    assert_eq!(timestamps, vec![60_000, 120_000]);

    // Other feeds stay invisible.
    let other = store
        .query_range("binance", "ETH/USDT", &timeframe, 0, 240_000)
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn fetch_set_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let key = FetchKey::new("binance", "BTC/USDT", Timeframe::parse("1m").unwrap());

    {
        let store = open_store(&dir).await;
        assert!(store.add(&key).await.unwrap());
        assert!(!store.add(&key).await.unwrap());
    }

    // A fresh connection to the same file sees the registered feed.
    let reopened = open_store(&dir).await;
    assert_eq!(reopened.fetch_set().await.unwrap(), vec![key]);
}
