//! Binance USD-M futures open interest REST producer.

use crate::{config::CollectorConfig, error::CollectorError};
use pricewin_data::RawEvent;
use reqwest::Client;
use serde_json::json;
use smol_str::SmolStr;
use std::time::Duration;
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Polls `GET /fapi/v1/openInterest` for one symbol per tick, cycling through every configured
/// symbol to stay within rate limits.
#[derive(Debug, Clone)]
pub struct OpenInterestPoller {
    client: Client,
    targets: Vec<(SmolStr, Url)>,
    poll_interval: Duration,
}

impl OpenInterestPoller {
    pub fn new(config: &CollectorConfig) -> Result<Self, CollectorError> {
        let targets = config
            .aggregator
            .symbols
            .iter()
            .map(|symbol| Ok((symbol.clone(), config.open_interest_url(symbol)?)))
            .collect::<Result<Vec<_>, CollectorError>>()?;

        Ok(Self {
            client: Client::new(),
            targets,
            poll_interval: config.poll_interval,
        })
    }

    /// Poll until `shutdown` is cancelled or the inbound receiver is dropped. HTTP and decode
    /// failures are logged and the next symbol is polled on the following tick.
    pub async fn run(self, tx: mpsc::Sender<RawEvent>, shutdown: CancellationToken) {
        info!(
            symbols = ?self.targets.iter().map(|(symbol, _)| symbol).collect::<Vec<_>>(),
            interval = ?self.poll_interval,
            "starting OpenInterestPoller"
        );

        let mut timer = tokio::time::interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for (symbol, url) in self.targets.iter().cycle() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.fetch(url) => result,
            };

            match result {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        warn!("inbound event receiver dropped, stopping OpenInterestPoller");
                        break;
                    }
                }
                Err(error) => {
                    warn!(%error, %symbol, "Binance open interest poll failed");
                }
            }
        }

        info!("OpenInterestPoller stopped");
    }

    async fn fetch(&self, url: &Url) -> Result<RawEvent, CollectorError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        debug!(payload = %response, "received Binance open interest");
        Ok(wrap_open_interest(response))
    }
}

/// Tag a `/fapi/v1/openInterest` response as an `openInterest` [`RawEvent`].
///
/// eg/ `{"e":"openInterest","oi":{"symbol":"BTCUSDT","openInterest":"10659.509","time":1589437530011}}`
pub fn wrap_open_interest(response: serde_json::Value) -> RawEvent {
    RawEvent(json!({ "e": "openInterest", "oi": response }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewin_data::{AggregatorConfig, EventNormalizer, NormalizedEvent};

    #[test]
    fn test_wrap_open_interest_normalises() {
        let response = json!({
            "symbol": "BTCUSDT",
            "openInterest": "10659.509",
            "time": 1589437530011_u64
        });

        let event = wrap_open_interest(response);
        assert_eq!(event.tag(), Some("openInterest"));

        match EventNormalizer::new().normalize(&event).unwrap() {
            NormalizedEvent::OpenInterest(oi) => {
                assert_eq!(oi.symbol, "btcusdt");
                assert_eq!(oi.value, 10659.509);
            }
            other => panic!("expected OpenInterest, got: {other:?}"),
        }
    }

    #[test]
    fn test_new_builds_url_per_symbol() {
        let config = CollectorConfig::default()
            .with_aggregator(AggregatorConfig::new(["btcusdt", "ethusdt"], 10.0, 2));

        let poller = OpenInterestPoller::new(&config).unwrap();
        let urls = poller
            .targets
            .iter()
            .map(|(_, url)| url.as_str())
            .collect::<Vec<_>>();

        assert_eq!(
            urls,
            vec![
                "https://fapi.binance.com/fapi/v1/openInterest?symbol=BTCUSDT",
                "https://fapi.binance.com/fapi/v1/openInterest?symbol=ETHUSDT",
            ]
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let config = CollectorConfig {
            rest_url: "http://127.0.0.1:1".to_string(),
            poll_interval: Duration::from_millis(10),
            ..CollectorConfig::default()
        };
        let (tx, _rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(OpenInterestPoller::new(&config).unwrap().run(tx, shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("OpenInterestPoller did not observe cancellation")
            .unwrap();
    }
}
