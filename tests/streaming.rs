// Derived streams: lazy startup, warm-up seeding and live computation

mod common;

use common::{candle, memory_service, test_fetch_options};

use beacon::indicators::MacdAccumulator;
use beacon::store::CandleStore;
use beacon::timeframe::Timeframe;
use beacon::types::{current_timestamp_millis, DataPoint};
use beacon::{BeaconError, StreamRequest};
use std::time::Duration;

fn macd_request(fast: u32, slow: u32) -> StreamRequest {
    let mut params = serde_json::Map::new();
    params.insert("exchange".to_string(), serde_json::json!("mock"));
    params.insert("symbol".to_string(), serde_json::json!("BTC/USDT"));
    params.insert("timeframe".to_string(), serde_json::json!("1m"));
    params.insert("ema_fast".to_string(), serde_json::json!(fast));
    params.insert("ema_slow".to_string(), serde_json::json!(slow));
    StreamRequest::from_json("macd", &params).unwrap()
}

/// Store `count` flat bars directly behind now and return their closes.
async fn seed_history(
    store: &dyn CandleStore,
    timeframe: &Timeframe,
    closes: &[f64],
) -> i64 {
    let aligned_now = timeframe.align_down(current_timestamp_millis());
    for (index, close) in closes.iter().enumerate() {
        let back = (closes.len() - index) as i64;
        store
            .upsert_candle(&candle(
                "mock",
                "BTC/USDT",
                timeframe,
                aligned_now - back * timeframe.as_millis(),
                *close,
            ))
            .await
            .unwrap();
    }
    aligned_now
}

/// A MACD subscription seeds from stored history, consumes live raw candles
/// in publication order and reports the zero-line cross exactly once.
#[tokio::test]
async fn macd_stream_seeds_from_history_and_tracks_live_candles() {
    let timeframe = Timeframe::parse("1m").unwrap();
    let (store, service) = memory_service(Vec::new(), test_fetch_options());

    let warmup = [100.0, 100.0, 100.0, 100.0, 100.0];
    let aligned_now = seed_history(store.as_ref(), &timeframe, &warmup).await;

    let request = macd_request(2, 5);
    let mut derived = service.registry().subscribe(&request).await.unwrap();

    // Live closes: a falling leg, one hard jump over the zero line, then
    // steady. Exactly one cross is expected.
    let live = [90.0, 85.0, 80.0, 150.0, 150.0];
    let raw_id = request.raw_prerequisite().stream_id();
    for (index, close) in live.iter().enumerate() {
        let timestamp = aligned_now + index as i64 * timeframe.as_millis();
        service.registry().publish(
            &raw_id,
            DataPoint::from_candle(&candle("mock", "BTC/USDT", &timeframe, timestamp, *close)),
        );
    }

    // The transform runs the same recurrence as a hand-seeded accumulator.
    let mut expected = MacdAccumulator::seed(2, 5, &warmup).unwrap();
    let mut crossings = Vec::new();
    for (index, close) in live.iter().enumerate() {
        let expected_point = expected.tick(*close);
        let point = tokio::time::timeout(Duration::from_secs(1), derived.recv())
            .await
            .expect("derived point within deadline")
            .expect("derived channel open");

        match point {
            DataPoint::Macd {
                timestamp,
                macd,
                ohlcv,
            } => {
                assert_eq!(
                    timestamp,
                    aligned_now + index as i64 * timeframe.as_millis(),
                    "points must arrive in publication order"
                );
                assert!((macd.macd - expected_point.macd).abs() < 1e-9);
                assert!((macd.ema_fast - expected_point.ema_fast).abs() < 1e-9);
                assert!((macd.ema_slow - expected_point.ema_slow).abs() < 1e-9);
                assert_eq!(macd.cross, expected_point.cross);
                assert_eq!(macd.rising, expected_point.rising);
                assert_eq!(ohlcv.close, *close);
                if macd.cross {
                    crossings.push(index);
                }
            }
            other => panic!("expected macd point, got {other:?}"),
        }
    }
    assert_eq!(crossings, vec![3], "exactly one zero-line cross");
}

/// The first subscriber starts the computation; later subscribers share it
/// and each still sees every point.
#[tokio::test]
async fn derived_computation_starts_once_and_fans_out() {
    let timeframe = Timeframe::parse("1m").unwrap();
    let (store, service) = memory_service(Vec::new(), test_fetch_options());
    let aligned_now = seed_history(store.as_ref(), &timeframe, &[10.0; 6]).await;

    let request = macd_request(2, 5);
    let mut first = service.registry().subscribe(&request).await.unwrap();
    let mut second = service.registry().subscribe(&request).await.unwrap();
    assert!(
        service
            .registry()
            .transform_running(&request.stream_id())
            .await
    );

    let raw_id = request.raw_prerequisite().stream_id();
    for index in 0..3i64 {
        service.registry().publish(
            &raw_id,
            DataPoint::from_candle(&candle(
                "mock",
                "BTC/USDT",
                &timeframe,
                aligned_now + index * timeframe.as_millis(),
                11.0 + index as f64,
            )),
        );
    }

    for receiver in [&mut first, &mut second] {
        let mut timestamps = Vec::new();
        for _ in 0..3 {
            let point = tokio::time::timeout(Duration::from_secs(1), receiver.recv())
                .await
                .expect("derived point within deadline")
                .expect("derived channel open");
            timestamps.push(point.timestamp());
        }
        assert_eq!(
            timestamps,
            vec![
                aligned_now,
                aligned_now + timeframe.as_millis(),
                aligned_now + 2 * timeframe.as_millis()
            ]
        );
    }
}

/// Without enough stored history the subscription fails synchronously and
/// nothing starts.
#[tokio::test]
async fn derived_subscription_without_history_fails_explicitly() {
    let (_store, service) = memory_service(Vec::new(), test_fetch_options());
    let request = macd_request(12, 26);

    let err = service.subscribe_add(&request).await.unwrap_err();
    assert!(matches!(
        err,
        BeaconError::InsufficientHistory { needed: 26, .. }
    ));
    assert!(
        !service
            .registry()
            .transform_running(&request.stream_id())
            .await
    );
}
