use pricewin_data::{AggregationError, ConfigError};
use thiserror::Error;

/// All errors generated in `pricewin-collector`.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("SocketError: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to write Block snapshot: {0}")]
    Csv(#[from] csv::Error),

    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialise subscription: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("AggregationPipeline halted: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("task failed to complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CollectorError {
    /// Determine if an error must shut the collector down.
    ///
    /// Connection level failures are retried by the producer that hit them.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            CollectorError::Socket(_) | CollectorError::Http(_) => false,
            CollectorError::Aggregation(error) => error.is_terminal(),
            _ => true,
        }
    }
}
