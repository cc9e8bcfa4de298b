use crate::{block::BucketKey, event::EventKind};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// All errors generated while normalising and aggregating market events in `pricewin-data`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum AggregationError {
    #[error("malformed {kind} record: {reason}")]
    Record { kind: EventKind, reason: String },

    #[error("unrecognised event type: {0}")]
    UnrecognisedEvent(String),

    #[error("event received for unconfigured symbol: {0}")]
    UnknownSymbol(SmolStr),

    #[error("priceless event for {symbol} arrived before any bucket was active")]
    PricelessRoutingMiss { symbol: SmolStr },

    #[error(
        "\
        CapacityViolation: bucket {key} cannot be opened, Block already holds \
        max_intervals {max_intervals} buckets \
    "
    )]
    CapacityViolation { key: BucketKey, max_intervals: usize },
}

impl AggregationError {
    /// Construct an [`AggregationError::Record`] for the provided [`EventKind`].
    pub fn record(kind: EventKind, reason: impl Into<String>) -> Self {
        Self::Record {
            kind,
            reason: reason.into(),
        }
    }

    /// Determine if an error must terminate the [`AggregationPipeline`](crate::pipeline::AggregationPipeline).
    ///
    /// Every per-event error is contained within the iteration that produced it. Only a
    /// [`AggregationError::CapacityViolation`] breaches a Block invariant and is terminal.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            AggregationError::CapacityViolation { .. } => true,
            _ => false,
        }
    }
}

/// Errors generated when validating an [`AggregatorConfig`](crate::config::AggregatorConfig).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum ConfigError {
    #[error("no trading symbols configured")]
    SymbolsEmpty,

    #[error("interval_size must be a positive finite number, got: {0}")]
    InvalidIntervalSize(f64),

    #[error("max_intervals must be at least 1")]
    InvalidMaxIntervals,

    #[error("channel capacity must be at least 1")]
    InvalidChannelCapacity,

    #[error("failed to parse environment variable {name}: {value}")]
    InvalidEnv { name: String, value: String },
}
