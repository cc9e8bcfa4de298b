//! Single consumer that drains raw events, aggregates them into per-symbol [`Block`]s and
//! forwards completed [`BlockSnapshot`]s towards the sink.

use crate::{
    block::Block,
    config::AggregatorConfig,
    error::{AggregationError, ConfigError},
    event::RawEvent,
    metrics::{PipelineMetrics, PipelineStats},
    normalizer::EventNormalizer,
    snapshot::BlockSnapshot,
};
use fnv::FnvHashMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Price windowed aggregation pipeline. Owns exactly one active [`Block`] per configured symbol.
#[derive(Debug)]
pub struct AggregationPipeline {
    config: AggregatorConfig,
    normalizer: EventNormalizer,
    blocks: FnvHashMap<SmolStr, Block>,
    metrics: Arc<PipelineMetrics>,
}

impl AggregationPipeline {
    pub fn new(config: AggregatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let blocks = config
            .symbols
            .iter()
            .map(|symbol| {
                let block = Block::new(symbol.clone(), config.interval_size, config.max_intervals);
                (symbol.clone(), block)
            })
            .collect();

        Ok(Self {
            config,
            normalizer: EventNormalizer::new(),
            blocks,
            metrics: Arc::new(PipelineMetrics::default()),
        })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Active [`Block`] for `symbol`.
    pub fn block(&self, symbol: &str) -> Option<&Block> {
        self.blocks.get(symbol)
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn stats(&self) -> PipelineStats {
        self.metrics.snapshot()
    }

    /// Process a single [`RawEvent`].
    ///
    /// Returns the [`BlockSnapshot`] of the Block that was rolled over to make room for this
    /// event, if any. The event is fully validated before a rollover is triggered, so a
    /// rejected event never flushes a Block.
    pub fn process(&mut self, raw: &RawEvent) -> Result<Option<BlockSnapshot>, AggregationError> {
        PipelineMetrics::incr(&self.metrics.events_received);

        let result = self.try_process(raw);
        match &result {
            Ok(_) => PipelineMetrics::incr(&self.metrics.events_applied),
            Err(error) if !error.is_terminal() => {
                PipelineMetrics::incr(&self.metrics.events_dropped)
            }
            Err(_) => {}
        }
        result
    }

    fn try_process(&mut self, raw: &RawEvent) -> Result<Option<BlockSnapshot>, AggregationError> {
        let event = self.normalizer.normalize(raw)?;
        let price = event.price();

        let block = self
            .blocks
            .get_mut(event.symbol())
            .ok_or_else(|| AggregationError::UnknownSymbol(event.symbol().clone()))?;

        let flushed = match price {
            Some(price) if !block.is_trackable(price) => {
                let completed = std::mem::replace(block, block.fresh());
                PipelineMetrics::incr(&self.metrics.rollovers);
                debug!(
                    symbol = %completed.symbol(),
                    buckets = completed.len(),
                    price,
                    "price left tracked buckets, rolling over Block"
                );
                Some(completed.export())
            }
            _ => None,
        };

        block.route_and_apply(&event, price)?;
        Ok(flushed)
    }

    /// Drain `inbound` until it closes or `shutdown` is cancelled, forwarding every rolled over
    /// [`BlockSnapshot`] to `outbound`.
    ///
    /// The dequeue waits at most `recv_timeout` so the stop signal is observed between events.
    /// Per-event errors are logged and the event is dropped. A terminal
    /// [`AggregationError::CapacityViolation`] ends the loop and is returned.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<RawEvent>,
        outbound: mpsc::Sender<BlockSnapshot>,
        shutdown: CancellationToken,
    ) -> Result<PipelineStats, AggregationError> {
        info!(
            symbols = ?self.config.symbols,
            interval_size = self.config.interval_size,
            max_intervals = self.config.max_intervals,
            "AggregationPipeline running"
        );

        while !shutdown.is_cancelled() {
            let raw = match tokio::time::timeout(self.config.recv_timeout, inbound.recv()).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    info!("inbound event channel closed, stopping AggregationPipeline");
                    break;
                }
                Err(_elapsed) => continue,
            };

            match self.process(&raw) {
                Ok(Some(snapshot)) => {
                    if outbound.send(snapshot).await.is_err() {
                        warn!("Block snapshot receiver dropped, stopping AggregationPipeline");
                        break;
                    }
                }
                Ok(None) => {}
                Err(error) if error.is_terminal() => {
                    error!(%error, %raw, "AggregationPipeline invariant breached");
                    return Err(error);
                }
                Err(
                    error @ (AggregationError::UnrecognisedEvent(_)
                    | AggregationError::PricelessRoutingMiss { .. }),
                ) => {
                    debug!(%error, %raw, "dropped event");
                }
                Err(error) => {
                    warn!(%error, %raw, "dropped malformed event");
                }
            }
        }

        let stats = self.stats();
        info!(?stats, "AggregationPipeline stopped");
        Ok(stats)
    }
}
