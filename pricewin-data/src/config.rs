use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{str::FromStr, time::Duration};

/// Configuration consumed by the aggregation core. Passed explicitly at construction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregatorConfig {
    /// Lowercase trading symbols, eg/ "btcusdt". Each gets its own independent Block.
    pub symbols: Vec<SmolStr>,
    /// Width of a price bucket.
    pub interval_size: f64,
    /// Maximum number of simultaneously open buckets per Block.
    pub max_intervals: usize,
    /// Bound of the inbound raw event queue.
    pub inbound_capacity: usize,
    /// Bound of the outbound Block snapshot queue.
    pub outbound_capacity: usize,
    /// How long a consumer waits on its queue before re-checking the stop signal.
    pub recv_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            symbols: vec![SmolStr::new_static("btcusdt")],
            interval_size: 10.0,
            max_intervals: 2,
            inbound_capacity: 10_000,
            outbound_capacity: 1_000,
            recv_timeout: Duration::from_secs(1),
        }
    }
}

impl AggregatorConfig {
    /// Create a new configuration w/ the provided symbols and bucket layout.
    pub fn new<Iter, S>(symbols: Iter, interval_size: f64, max_intervals: usize) -> Self
    where
        Iter: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            interval_size,
            max_intervals,
            ..Default::default()
        }
        .with_symbols(symbols)
    }

    /// Set the trading symbols. Symbols are lowercased and de-duplicated, preserving order.
    pub fn with_symbols<Iter, S>(mut self, symbols: Iter) -> Self
    where
        Iter: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.symbols.clear();
        for symbol in symbols {
            let symbol = SmolStr::new(symbol.as_ref().trim().to_lowercase());
            if !symbol.is_empty() && !self.symbols.contains(&symbol) {
                self.symbols.push(symbol);
            }
        }
        self
    }

    pub fn with_interval_size(mut self, interval_size: f64) -> Self {
        self.interval_size = interval_size;
        self
    }

    pub fn with_max_intervals(mut self, max_intervals: usize) -> Self {
        self.max_intervals = max_intervals;
        self
    }

    pub fn with_channel_capacity(mut self, inbound: usize, outbound: usize) -> Self {
        self.inbound_capacity = inbound;
        self.outbound_capacity = outbound;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Apply overrides from `PRICEWIN_SYMBOLS` (comma separated), `PRICEWIN_INTERVAL_SIZE`,
    /// `PRICEWIN_MAX_INTERVALS` and `PRICEWIN_CHANNEL_CAPACITY` if set.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(symbols) = std::env::var("PRICEWIN_SYMBOLS") {
            self = self.with_symbols(symbols.split(','));
        }
        if let Some(interval_size) = env_parse("PRICEWIN_INTERVAL_SIZE")? {
            self.interval_size = interval_size;
        }
        if let Some(max_intervals) = env_parse("PRICEWIN_MAX_INTERVALS")? {
            self.max_intervals = max_intervals;
        }
        if let Some(capacity) = env_parse("PRICEWIN_CHANNEL_CAPACITY")? {
            self.inbound_capacity = capacity;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::SymbolsEmpty);
        }
        if !(self.interval_size.is_finite() && self.interval_size > 0.0) {
            return Err(ConfigError::InvalidIntervalSize(self.interval_size));
        }
        if self.max_intervals == 0 {
            return Err(ConfigError::InvalidMaxIntervals);
        }
        if self.inbound_capacity == 0 || self.outbound_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity);
        }
        Ok(())
    }
}

/// Parse the environment variable `name` if it is set.
pub fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
