//! # Pricewin-Data
//! Price windowed aggregation of Binance USD-M futures market events.
//!
//! Raw feed payloads are normalised into typed [`NormalizedEvent`]s, routed into fixed width
//! price buckets ([`Interval`]s) and accumulated inside a bounded per-symbol [`Block`]. Once
//! price leaves every tracked bucket and the [`Block`] is at capacity, it is exported as an
//! immutable [`BlockSnapshot`] and replaced by an empty one.
//!
//! ## Components
//! * [`EventNormalizer`]: raw JSON payload -> validated [`NormalizedEvent`].
//! * [`Interval`]: per bucket maker/taker volume, liquidations and open interest OHLC.
//! * [`Block`]: bounded, insertion ordered set of [`Interval`]s for one symbol.
//! * [`AggregationPipeline`]: single consumer driving rollover and routing.
//!
//! ## Example
//! ```rust
//! use pricewin_data::{AggregationPipeline, AggregatorConfig, RawEvent};
//! use serde_json::json;
//!
//! let config = AggregatorConfig::new(["btcusdt"], 10.0, 2);
//! let mut pipeline = AggregationPipeline::new(config).unwrap();
//!
//! let trade = RawEvent(json!({ "e": "aggTrade", "s": "BTCUSDT", "p": "23.5", "q": "1", "m": true }));
//! assert_eq!(pipeline.process(&trade), Ok(None));
//! assert_eq!(pipeline.block("btcusdt").unwrap().len(), 1);
//! ```

/// Bounded set of concurrently tracked price buckets for one symbol.
pub mod block;

/// [`AggregatorConfig`] consumed by the aggregation core.
pub mod config;

/// Serde helpers for string encoded numerics.
pub mod de;

/// All [`Error`](std::error::Error)s generated in Pricewin-Data.
pub mod error;

/// Raw and normalised market event types.
pub mod event;

/// Per bucket accumulator.
pub mod interval;

/// Atomic counters for the [`AggregationPipeline`].
pub mod metrics;

/// Binance wire format -> [`NormalizedEvent`] translation.
pub mod normalizer;

/// Rollover and routing consume loop.
pub mod pipeline;

/// Exported Block state and its flattened row representation.
pub mod snapshot;

pub use block::{Block, BucketKey};
pub use config::AggregatorConfig;
pub use error::{AggregationError, ConfigError};
pub use event::{EventKind, NormalizedEvent, RawEvent};
pub use interval::{Interval, IntervalSnapshot};
pub use metrics::{PipelineMetrics, PipelineStats};
pub use normalizer::EventNormalizer;
pub use pipeline::AggregationPipeline;
pub use snapshot::BlockSnapshot;

