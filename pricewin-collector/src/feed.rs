//! Binance USD-M futures WebSocket producer.
//!
//! Subscribes to `{symbol}@{stream}` for every configured symbol and stream, and forwards each
//! tagged event payload to the inbound queue as a [`RawEvent`]. Reconnects after
//! `reconnect_delay` whenever the connection drops.

use crate::{config::CollectorConfig, error::CollectorError};
use futures::{SinkExt, StreamExt};
use pricewin_data::RawEvent;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Binance WebSocket `SUBSCRIBE` request.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Live-Subscribing-Unsubscribing-to-streams>
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeRequest {
    pub method: &'static str,
    pub params: Vec<String>,
    pub id: u64,
}

impl SubscribeRequest {
    pub fn new(params: Vec<String>) -> Self {
        Self {
            method: "SUBSCRIBE",
            params,
            id: 1,
        }
    }
}

/// WebSocket producer configuration.
#[derive(Debug, Clone)]
pub struct BinanceFeed {
    url: String,
    stream_names: Vec<String>,
    reconnect_delay: Duration,
}

/// Outcome of a single connection, used to decide whether to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    Reconnect,
    Shutdown,
}

impl BinanceFeed {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            stream_names: config.stream_names(),
            reconnect_delay: config.reconnect_delay,
        }
    }

    /// Run the connection loop until `shutdown` is cancelled or the inbound receiver is dropped.
    pub async fn run(self, tx: mpsc::Sender<RawEvent>, shutdown: CancellationToken) {
        info!(url = %self.url, streams = ?self.stream_names, "starting BinanceFeed");

        loop {
            let disconnect = tokio::select! {
                _ = shutdown.cancelled() => Disconnect::Shutdown,
                result = self.connect_and_forward(&tx) => match result {
                    Ok(disconnect) => disconnect,
                    Err(error) => {
                        error!(%error, url = %self.url, "BinanceFeed connection failed");
                        Disconnect::Reconnect
                    }
                },
            };

            if disconnect == Disconnect::Shutdown {
                break;
            }

            debug!(delay = ?self.reconnect_delay, "waiting before reconnecting BinanceFeed");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!("BinanceFeed stopped");
    }

    async fn connect_and_forward(
        &self,
        tx: &mpsc::Sender<RawEvent>,
    ) -> Result<Disconnect, CollectorError> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        info!(url = %self.url, "connected to Binance WebSocket");

        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::to_string(&SubscribeRequest::new(self.stream_names.clone()))?;
        write.send(Message::text(subscribe)).await?;

        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => {
                    let Some(event) = parse_frame(text.as_str()) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        warn!("inbound event receiver dropped, stopping BinanceFeed");
                        return Ok(Disconnect::Shutdown);
                    }
                }
                Message::Close(frame) => {
                    info!(?frame, "Binance closed WebSocket connection");
                    return Ok(Disconnect::Reconnect);
                }
                _ => {}
            }
        }

        warn!("Binance WebSocket stream ended");
        Ok(Disconnect::Reconnect)
    }
}

/// Parse a text frame into a [`RawEvent`].
///
/// Only JSON objects carrying an `"e"` event tag are forwarded. Subscription acks, eg/
/// `{"result":null,"id":1}`, and undecodable frames are skipped.
pub fn parse_frame(text: &str) -> Option<RawEvent> {
    let value = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, payload = text, "failed to parse Binance WebSocket frame");
            return None;
        }
    };

    let event = RawEvent(value);
    if event.tag().is_none() {
        debug!(payload = text, "skipping untagged Binance WebSocket frame");
        return None;
    }

    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewin_data::AggregatorConfig;
    use serde_json::json;

    #[test]
    fn test_subscribe_request() {
        let config = CollectorConfig::default()
            .with_aggregator(AggregatorConfig::new(["btcusdt"], 10.0, 2));

        let actual = serde_json::to_value(SubscribeRequest::new(config.stream_names())).unwrap();
        let expected = json!({
            "method": "SUBSCRIBE",
            "params": ["btcusdt@aggTrade", "btcusdt@forceOrder"],
            "id": 1
        });

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_parse_frame() {
        struct TestCase {
            input: &'static str,
            expected: Option<&'static str>,
        }

        let tests = vec![
            TestCase {
                // TC0: aggTrade event
                input: r#"{"e":"aggTrade","E":1700000000000,"s":"BTCUSDT","p":"37000.1","q":"0.5","m":true}"#,
                expected: Some("aggTrade"),
            },
            TestCase {
                // TC1: forceOrder event
                input: r#"{"e":"forceOrder","E":1700000000000,"o":{"s":"BTCUSDT","S":"SELL","q":"0.01","p":"36950"}}"#,
                expected: Some("forceOrder"),
            },
            TestCase {
                // TC2: subscription ack is skipped
                input: r#"{"result":null,"id":1}"#,
                expected: None,
            },
            TestCase {
                // TC3: invalid json is skipped
                input: "not json",
                expected: None,
            },
            TestCase {
                // TC4: non object json is skipped
                input: "[1,2,3]",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = parse_frame(test.input);
            assert_eq!(
                actual.as_ref().and_then(RawEvent::tag),
                test.expected,
                "TC{} failed",
                index
            );
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation_while_unreachable() {
        let config = CollectorConfig {
            ws_url: "ws://127.0.0.1:1".to_string(),
            reconnect_delay: Duration::from_secs(60),
            ..CollectorConfig::default()
        };
        let (tx, _rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(BinanceFeed::new(&config).run(tx, shutdown.clone()));
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("BinanceFeed did not observe cancellation")
            .unwrap();
    }
}
