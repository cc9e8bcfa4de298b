//! Integration tests for the AggregationPipeline consume loop.
//!
//! Producers push raw feed payloads into a bounded inbound channel, a single pipeline task
//! drains it and rolled over Blocks are observed on the outbound channel.

use pricewin_data::{
    AggregationPipeline, AggregatorConfig, BlockSnapshot, BucketKey, PipelineStats, RawEvent,
};
use serde_json::json;
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

fn trade(symbol: &str, price: &str, quantity: &str, is_buyer_maker: bool) -> RawEvent {
    RawEvent(json!({ "e": "aggTrade", "s": symbol, "p": price, "q": quantity, "m": is_buyer_maker }))
}

fn liquidation(symbol: &str, side: &str, price: &str, quantity: &str) -> RawEvent {
    RawEvent(json!({ "e": "forceOrder", "o": { "s": symbol, "S": side, "p": price, "q": quantity } }))
}

fn open_interest(symbol: &str, value: &str) -> RawEvent {
    RawEvent(json!({ "e": "openInterest", "oi": { "symbol": symbol, "openInterest": value } }))
}

struct Harness {
    inbound: mpsc::Sender<RawEvent>,
    outbound: mpsc::Receiver<BlockSnapshot>,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<PipelineStats, pricewin_data::AggregationError>>,
}

fn spawn_pipeline(config: AggregatorConfig) -> Harness {
    let config = config.with_recv_timeout(Duration::from_millis(10));
    let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
    let shutdown = CancellationToken::new();

    let pipeline = AggregationPipeline::new(config).unwrap();
    let handle = tokio::spawn(pipeline.run(inbound_rx, outbound_tx, shutdown.clone()));

    Harness {
        inbound: inbound_tx,
        outbound: outbound_rx,
        shutdown,
        handle,
    }
}

#[tokio::test]
async fn test_run_forwards_rolled_over_blocks() {
    let Harness {
        inbound,
        mut outbound,
        handle,
        ..
    } = spawn_pipeline(AggregatorConfig::new(["btcusdt"], 10.0, 2));

    let events = vec![
        trade("BTCUSDT", "15", "1", true),
        open_interest("BTCUSDT", "100"),
        trade("BTCUSDT", "25", "2", false),
        liquidation("BTCUSDT", "SELL", "27", "0.5"),
        open_interest("BTCUSDT", "80"),
        open_interest("BTCUSDT", "120"),
        // Third distinct bucket w/ max_intervals 2 triggers a rollover
        trade("BTCUSDT", "35", "3", true),
        trade("BTCUSDT", "44", "1", true),
        // Rollover again
        trade("BTCUSDT", "51", "1", false),
    ];
    for event in events {
        inbound.send(event).await.unwrap();
    }
    drop(inbound);

    let first = outbound.recv().await.unwrap();
    assert_eq!(first.symbol, "btcusdt");
    assert_eq!(
        first.buckets.keys().copied().collect::<Vec<_>>(),
        vec![BucketKey::from(10.0), BucketKey::from(20.0)]
    );

    let lower = &first.buckets[&BucketKey::from(10.0)];
    assert_eq!(lower.maker_volume, 1.0);
    assert_eq!(lower.open_interest.open, Some(100.0));
    assert_eq!(lower.open_interest.close, Some(100.0));

    let upper = &first.buckets[&BucketKey::from(20.0)];
    assert_eq!(upper.taker_volume, 2.0);
    assert_eq!(upper.liquidations.sell_volume, 0.5);
    assert_eq!(upper.open_interest.open, Some(80.0));
    assert_eq!(upper.open_interest.high, Some(120.0));

    let second = outbound.recv().await.unwrap();
    assert_eq!(
        second.buckets.keys().copied().collect::<Vec<_>>(),
        vec![BucketKey::from(30.0), BucketKey::from(40.0)]
    );

    // Inbound closed: loop ends, the still open Block is not flushed
    let stats = handle.await.unwrap().unwrap();
    assert!(outbound.recv().await.is_none());
    assert_eq!(stats.events_received, 9);
    assert_eq!(stats.events_applied, 9);
    assert_eq!(stats.events_dropped, 0);
    assert_eq!(stats.rollovers, 2);
}

#[tokio::test]
async fn test_run_keeps_processing_after_malformed_events() {
    let Harness {
        inbound,
        mut outbound,
        handle,
        ..
    } = spawn_pipeline(AggregatorConfig::new(["btcusdt"], 10.0, 1));

    let events = vec![
        // Priceless before any bucket is active
        open_interest("BTCUSDT", "5"),
        trade("BTCUSDT", "15", "1", true),
        RawEvent(json!({ "e": "aggTrade", "s": "BTCUSDT", "p": "not-a-price", "q": "1", "m": true })),
        RawEvent(json!({ "e": "bookTicker", "s": "BTCUSDT" })),
        RawEvent(json!({ "s": "BTCUSDT", "p": "15" })),
        trade("XRPUSDT", "0.5", "100", false),
        liquidation("BTCUSDT", "HOLD", "15", "1"),
        trade("BTCUSDT", "-15", "1", true),
        trade("BTCUSDT", "16", "2", true),
        trade("BTCUSDT", "21", "1", false),
    ];
    for event in events {
        inbound.send(event).await.unwrap();
    }
    drop(inbound);

    let flushed = outbound.recv().await.unwrap();
    assert_eq!(flushed.buckets.len(), 1);
    let interval = &flushed.buckets[&BucketKey::from(10.0)];
    assert_eq!(interval.maker_volume, 3.0);
    assert!(interval.open_interest.open.is_none());

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.events_received, 10);
    assert_eq!(stats.events_dropped, 7);
    assert_eq!(stats.events_applied, 3);
    assert_eq!(stats.rollovers, 1);
}

#[tokio::test]
async fn test_run_symbols_roll_over_independently() {
    let Harness {
        inbound,
        mut outbound,
        handle,
        ..
    } = spawn_pipeline(AggregatorConfig::new(["btcusdt", "ethusdt"], 10.0, 1));

    let events = vec![
        trade("BTCUSDT", "15", "1", true),
        trade("ETHUSDT", "3005", "1", true),
        trade("ETHUSDT", "3001", "1", false),
        trade("BTCUSDT", "25", "1", true),
    ];
    for event in events {
        inbound.send(event).await.unwrap();
    }
    drop(inbound);

    let flushed = outbound.recv().await.unwrap();
    assert_eq!(flushed.symbol, "btcusdt");
    assert!(outbound.recv().await.is_none());

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.rollovers, 1);
}

#[tokio::test]
async fn test_run_stops_on_cancellation() {
    let Harness {
        inbound,
        outbound: _outbound,
        shutdown,
        handle,
    } = spawn_pipeline(AggregatorConfig::default());

    inbound.send(trade("BTCUSDT", "15", "1", true)).await.unwrap();
    shutdown.cancel();

    // Inbound sender is still alive, only the stop signal ends the loop
    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pipeline did not observe cancellation")
        .unwrap()
        .unwrap();
    assert!(stats.events_received <= 1);
}

#[tokio::test]
async fn test_run_multiple_producers_share_inbound_channel() {
    let Harness {
        inbound,
        mut outbound,
        handle,
        ..
    } = spawn_pipeline(AggregatorConfig::new(["btcusdt"], 100.0, 1));

    let producers = (0..4)
        .map(|_| {
            let tx = inbound.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    tx.send(trade("BTCUSDT", "150", "1", true)).await.unwrap();
                }
            })
        })
        .collect::<Vec<_>>();

    for producer in producers {
        producer.await.unwrap();
    }
    inbound.send(trade("BTCUSDT", "250", "1", true)).await.unwrap();
    drop(inbound);

    let flushed = outbound.recv().await.unwrap();
    assert_eq!(flushed.buckets[&BucketKey::from(100.0)].maker_volume, 100.0);

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.events_applied, 101);
}
