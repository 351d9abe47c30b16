// Subscription transport: endpoints, wire format and subscriber isolation

mod common;

use common::{candle, memory_service, test_fetch_options, wait_until};

use beacon::timeframe::Timeframe;
use beacon::types::DataPoint;
use beacon::StreamRequest;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

fn raw_request() -> StreamRequest {
    StreamRequest::ohlcv("mock", "BTC/USDT", &Timeframe::parse("1m").unwrap())
}

/// Read from the socket until `count` records parse out of the byte stream.
///
/// Records are concatenated JSON objects with no framing between them; the
/// serialization format's own structure is the only delimiter.
async fn read_records(socket: &mut TcpStream, count: usize) -> Vec<DataPoint> {
    let mut buffer = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);

    loop {
        let parsed: Vec<DataPoint> = serde_json::Deserializer::from_slice(&buffer)
            .into_iter()
            .filter_map(Result::ok)
            .collect();
        if parsed.len() >= count {
            return parsed;
        }

        let mut chunk = [0u8; 4096];
        let read = tokio::time::timeout_at(deadline, socket.read(&mut chunk))
            .await
            .expect("socket data within deadline")
            .expect("socket readable");
        assert!(read > 0, "socket closed before all records arrived");
        buffer.extend_from_slice(&chunk[..read]);
    }
}

/// Repeat subscribe requests reuse one endpoint, and a connected subscriber
/// receives every published record, independently parseable and in order.
#[tokio::test]
async fn subscriber_receives_self_delimiting_records_in_order() {
    let timeframe = Timeframe::parse("1m").unwrap();
    let (_store, service) = memory_service(Vec::new(), test_fetch_options());
    let request = raw_request();

    let (stream_id, addr) = service.subscribe_add(&request).await.unwrap();
    let (again_id, again_addr) = service.subscribe_add(&request).await.unwrap();
    assert_eq!(stream_id, again_id);
    assert_eq!(addr, again_addr, "repeat requests return the same endpoint");

    let mut socket = TcpStream::connect(addr).await.unwrap();

    // The accept loop registers the channel asynchronously; publish only
    // once the subscription is live.
    let registry = service.registry().clone();
    let id = stream_id.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            let registry = registry.clone();
            let id = id.clone();
            async move { registry.subscriber_count(&id) >= 1 }
        })
        .await,
        "subscriber registered"
    );

    for (index, close) in [100.0, 101.5, 99.25].iter().enumerate() {
        service.registry().publish(
            &stream_id,
            DataPoint::from_candle(&candle(
                "mock",
                "BTC/USDT",
                &timeframe,
                60_000 * (index as i64 + 1),
                *close,
            )),
        );
    }

    let records = read_records(&mut socket, 3).await;
    let timestamps: Vec<i64> = records.iter().map(DataPoint::timestamp).collect();
    assert_eq!(timestamps, vec![60_000, 120_000, 180_000]);
    match &records[1] {
        DataPoint::Ohlcv { ohlcv, .. } => assert_eq!(ohlcv.close, 101.5),
        other => panic!("expected ohlcv record, got {other:?}"),
    }
}

/// A subscriber that never reads does not hold up its siblings.
#[tokio::test]
async fn slow_subscriber_does_not_stall_siblings() {
    let timeframe = Timeframe::parse("1m").unwrap();
    let (_store, service) = memory_service(Vec::new(), test_fetch_options());
    let request = raw_request();

    let (stream_id, addr) = service.subscribe_add(&request).await.unwrap();

    // The slow subscriber connects and then never reads.
    let _slow = TcpStream::connect(addr).await.unwrap();
    let mut active = TcpStream::connect(addr).await.unwrap();

    let registry = service.registry().clone();
    let id = stream_id.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            let registry = registry.clone();
            let id = id.clone();
            async move { registry.subscriber_count(&id) == 2 }
        })
        .await,
        "both subscribers registered"
    );

    for index in 0..50i64 {
        service.registry().publish(
            &stream_id,
            DataPoint::from_candle(&candle(
                "mock",
                "BTC/USDT",
                &timeframe,
                60_000 * (index + 1),
                100.0 + index as f64,
            )),
        );
    }

    let records = read_records(&mut active, 50).await;
    assert_eq!(records.len(), 50);
    assert_eq!(records[49].timestamp(), 60_000 * 50);
}

/// A disconnected subscriber is cleaned up locally; the stream and its other
/// subscribers keep working.
#[tokio::test]
async fn disconnect_cleans_up_only_that_subscriber() {
    let timeframe = Timeframe::parse("1m").unwrap();
    let (_store, service) = memory_service(Vec::new(), test_fetch_options());
    let request = raw_request();

    let (stream_id, addr) = service.subscribe_add(&request).await.unwrap();

    let dropped = TcpStream::connect(addr).await.unwrap();
    let mut survivor = TcpStream::connect(addr).await.unwrap();

    let registry = service.registry().clone();
    let id = stream_id.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            let registry = registry.clone();
            let id = id.clone();
            async move { registry.subscriber_count(&id) == 2 }
        })
        .await,
        "both subscribers registered"
    );

    drop(dropped);

    // Publish until the dead channel is pruned; the survivor sees every
    // point throughout.
    let registry = service.registry().clone();
    let publish_id = stream_id.clone();
    let tf = timeframe.clone();
    let mut published = 0i64;
    assert!(
        wait_until(Duration::from_secs(5), || {
            published += 1;
            registry.publish(
                &publish_id,
                DataPoint::from_candle(&candle(
                    "mock",
                    "BTC/USDT",
                    &tf,
                    60_000 * published,
                    100.0,
                )),
            );
            let registry = registry.clone();
            let id = publish_id.clone();
            async move { registry.subscriber_count(&id) == 1 }
        })
        .await,
        "dead subscriber pruned from fan-out"
    );

    let records = read_records(&mut survivor, published as usize).await;
    assert_eq!(records.len(), published as usize);
}
