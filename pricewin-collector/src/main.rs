use crate::{
    config::CollectorConfig,
    error::CollectorError,
    feed::BinanceFeed,
    poller::OpenInterestPoller,
    sink::{CsvBlockSink, run_sink},
};
use chrono::Utc;
use pricewin_data::{AggregationPipeline, PipelineMetrics};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod error;
mod feed;
mod poller;
mod sink;

const STATS_LOG_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    info!("Starting pricewin-collector");

    if let Err(error) = run().await {
        error!(%error, terminal = error.is_terminal(), "pricewin-collector failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CollectorError> {
    // Configurable via PRICEWIN_* env vars
    let config = CollectorConfig::from_env()?;
    let aggregator = config.aggregator.clone();

    info!(
        symbols = ?aggregator.symbols,
        interval_size = aggregator.interval_size,
        max_intervals = aggregator.max_intervals,
        ws_url = %config.ws_url,
        rest_url = %config.rest_url,
        runtime = ?config.runtime,
        "loaded CollectorConfig"
    );

    let shutdown = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(aggregator.inbound_capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(aggregator.outbound_capacity);

    let pipeline = AggregationPipeline::new(aggregator.clone())?;
    let poller = OpenInterestPoller::new(&config)?;
    let feed = BinanceFeed::new(&config);
    let sink = CsvBlockSink::new(
        &config.output_dir,
        Utc::now(),
        aggregator.interval_size,
        aggregator.max_intervals,
    );
    info!(path = %sink.path().display(), "Block snapshots will be written on first rollover");

    // Producers
    let feed_handle = tokio::spawn(feed.run(inbound_tx.clone(), shutdown.clone()));
    let poller_handle = tokio::spawn(poller.run(inbound_tx, shutdown.clone()));

    // Consumers
    let stats_handle = tokio::spawn(log_pipeline_stats(
        pipeline.metrics(),
        STATS_LOG_PERIOD,
        shutdown.clone(),
    ));
    let pipeline_handle = tokio::spawn(pipeline.run(inbound_rx, outbound_tx, shutdown.clone()));
    let sink_handle = tokio::spawn(run_sink(
        sink,
        outbound_rx,
        aggregator.recv_timeout,
        shutdown.clone(),
    ));

    tokio::spawn(shutdown_on_signal(config.runtime, shutdown.clone()));

    // A failed sink cancels shutdown itself, so the pipeline never outlives it
    let pipeline_result = pipeline_handle.await?;
    shutdown.cancel();

    let sink_result = sink_handle.await?;
    feed_handle.await?;
    poller_handle.await?;
    stats_handle.await?;

    let stats = pipeline_result?;
    let sink = sink_result?;

    info!(
        ?stats,
        rows = sink.rows(),
        path = %sink.path().display(),
        "pricewin-collector stopped"
    );
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C, or once the optional `runtime` has elapsed.
async fn shutdown_on_signal(runtime: Option<Duration>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await
        }
    };

    let runtime_elapsed = async {
        match runtime {
            Some(runtime) => tokio::time::sleep(runtime).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = runtime_elapsed => info!(?runtime, "runtime elapsed, shutting down"),
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}

/// Log a [`PipelineStats`](pricewin_data::PipelineStats) snapshot every `period` until
/// `shutdown` is cancelled.
async fn log_pipeline_stats(
    metrics: Arc<PipelineMetrics>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let stats = metrics.snapshot();
                info!(
                    events_received = stats.events_received,
                    events_applied = stats.events_applied,
                    events_dropped = stats.events_dropped,
                    rollovers = stats.rollovers,
                    "AggregationPipeline stats"
                );
            }
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(cfg!(debug_assertions))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_on_signal_after_runtime() {
        let shutdown = CancellationToken::new();

        tokio::time::timeout(
            Duration::from_secs(5),
            shutdown_on_signal(Some(Duration::from_millis(10)), shutdown.clone()),
        )
        .await
        .unwrap();

        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_on_signal_returns_when_already_cancelled() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), shutdown_on_signal(None, shutdown))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_log_pipeline_stats_stops_on_cancellation() {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(log_pipeline_stats(
            Arc::new(PipelineMetrics::default()),
            Duration::from_millis(5),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("stats logger did not observe cancellation")
            .unwrap();
    }
}
