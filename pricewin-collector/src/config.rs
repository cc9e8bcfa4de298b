use crate::error::CollectorError;
use pricewin_data::{AggregatorConfig, config::env_parse};
use smol_str::SmolStr;
use std::{path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_WS_URL: &str = "wss://fstream.binance.com/ws";
pub const DEFAULT_REST_URL: &str = "https://fapi.binance.com";

/// Runtime configuration of the collector binary.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Configuration handed to the [`AggregationPipeline`](pricewin_data::AggregationPipeline).
    pub aggregator: AggregatorConfig,
    /// Binance USD-M futures WebSocket endpoint.
    pub ws_url: String,
    /// Binance USD-M futures REST base url.
    pub rest_url: String,
    /// Stream names subscribed for every symbol, eg/ "aggTrade" -> "btcusdt@aggTrade".
    pub streams: Vec<SmolStr>,
    /// Delay between two open interest polls. Symbols are polled in rotation.
    pub poll_interval: Duration,
    /// Wait before re-connecting a dropped WebSocket.
    pub reconnect_delay: Duration,
    /// Directory the Block snapshot CSV is written to.
    pub output_dir: PathBuf,
    /// Stop after this long. Runs until Ctrl-C if unset.
    pub runtime: Option<Duration>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            aggregator: AggregatorConfig::default(),
            ws_url: DEFAULT_WS_URL.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
            streams: vec![
                SmolStr::new_static("aggTrade"),
                SmolStr::new_static("forceOrder"),
            ],
            poll_interval: Duration::from_millis(500),
            reconnect_delay: Duration::from_secs(2),
            output_dir: PathBuf::from("."),
            runtime: None,
        }
    }
}

impl CollectorConfig {
    /// Load the default configuration w/ `PRICEWIN_*` environment overrides applied.
    pub fn from_env() -> Result<Self, CollectorError> {
        let mut config = Self {
            aggregator: AggregatorConfig::default().with_env_overrides()?,
            ..Self::default()
        };

        if let Some(ws_url) = env_parse("PRICEWIN_WS_URL")? {
            config.ws_url = ws_url;
        }
        if let Some(rest_url) = env_parse("PRICEWIN_REST_URL")? {
            config.rest_url = rest_url;
        }
        if let Some(millis) = env_parse::<u64>("PRICEWIN_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(millis);
        }
        if let Some(output_dir) = env_parse::<PathBuf>("PRICEWIN_OUTPUT_DIR")? {
            config.output_dir = output_dir;
        }
        if let Some(secs) = env_parse::<u64>("PRICEWIN_RUNTIME_SECS")? {
            config.runtime = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_streams<Iter, S>(mut self, streams: Iter) -> Self
    where
        Iter: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.streams = streams
            .into_iter()
            .map(|stream| SmolStr::new(stream.as_ref()))
            .collect();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        self.aggregator.validate()?;
        Url::parse(&self.ws_url)?;
        Url::parse(&self.rest_url)?;
        Ok(())
    }

    /// Stream names of the WebSocket SUBSCRIBE request, one per symbol and stream.
    pub fn stream_names(&self) -> Vec<String> {
        self.aggregator
            .symbols
            .iter()
            .flat_map(|symbol| {
                self.streams
                    .iter()
                    .map(move |stream| format!("{symbol}@{stream}"))
            })
            .collect()
    }

    /// Open interest endpoint for the upper case `symbol`.
    pub fn open_interest_url(&self, symbol: &str) -> Result<Url, CollectorError> {
        let mut url = Url::parse(&self.rest_url)?.join("/fapi/v1/openInterest")?;
        url.query_pairs_mut()
            .append_pair("symbol", &symbol.to_uppercase());
        Ok(url)
    }
}
