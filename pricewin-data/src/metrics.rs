use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the [`AggregationPipeline`](crate::pipeline::AggregationPipeline).
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub events_received: AtomicU64,
    pub events_applied: AtomicU64,
    pub events_dropped: AtomicU64,
    pub rollovers: AtomicU64,
}

impl PipelineMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            rollovers: self.rollovers.load(Ordering::Relaxed),
        }
    }
}

/// Point in time copy of [`PipelineMetrics`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct PipelineStats {
    pub events_received: u64,
    pub events_applied: u64,
    pub events_dropped: u64,
    pub rollovers: u64,
}
