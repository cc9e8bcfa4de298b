//! Persistence of rolled over [`BlockSnapshot`]s.

use crate::error::CollectorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricewin_data::BlockSnapshot;
use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Collaborator that persists exported [`BlockSnapshot`]s.
#[async_trait]
pub trait BlockSink: Send {
    async fn write(&mut self, snapshot: BlockSnapshot) -> Result<(), CollectorError>;
}

/// Writes one flattened row per [`BlockSnapshot`] to
/// `datablocks_{start}_{interval_size}_{max_intervals}.csv`.
///
/// The file and its header are created w/ the first row. Every row is flushed as soon as it
/// is written.
#[derive(Debug)]
pub struct CsvBlockSink {
    path: PathBuf,
    max_intervals: usize,
    writer: Option<csv::Writer<File>>,
    rows: u64,
}

impl CsvBlockSink {
    pub fn new(
        output_dir: impl AsRef<Path>,
        start: DateTime<Utc>,
        interval_size: f64,
        max_intervals: usize,
    ) -> Self {
        Self {
            path: output_dir
                .as_ref()
                .join(Self::file_name(start, interval_size, max_intervals)),
            max_intervals,
            writer: None,
            rows: 0,
        }
    }

    pub fn file_name(start: DateTime<Utc>, interval_size: f64, max_intervals: usize) -> String {
        format!(
            "datablocks_{}_{interval_size}_{max_intervals}.csv",
            start.format("%Y-%m-%d_%H-%M-%S")
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn create_writer(&self) -> Result<csv::Writer<File>, CollectorError> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(BlockSnapshot::columns(self.max_intervals))?;
        info!(path = %self.path.display(), "created Block snapshot file");
        Ok(writer)
    }
}

#[async_trait]
impl BlockSink for CsvBlockSink {
    async fn write(&mut self, snapshot: BlockSnapshot) -> Result<(), CollectorError> {
        if snapshot.max_intervals != self.max_intervals {
            warn!(
                expected = self.max_intervals,
                actual = snapshot.max_intervals,
                symbol = %snapshot.symbol,
                "BlockSnapshot max_intervals does not match CSV layout"
            );
        }

        let record = snapshot.to_record();
        let writer = match self.writer {
            Some(ref mut writer) => writer,
            None => {
                let writer = self.create_writer()?;
                self.writer.insert(writer)
            }
        };
        writer.write_record(&record)?;
        writer.flush()?;

        self.rows += 1;
        debug!(
            symbol = %snapshot.symbol,
            buckets = snapshot.buckets.len(),
            rows = self.rows,
            "wrote BlockSnapshot"
        );
        Ok(())
    }
}

/// Drain `rx` into `sink` until the channel closes or `shutdown` is cancelled.
///
/// Waits at most `recv_timeout` per dequeue so the stop signal is observed between snapshots.
/// A failed write cancels `shutdown`, so producers and the pipeline stop too, and is returned.
pub async fn run_sink<Sink>(
    mut sink: Sink,
    mut rx: mpsc::Receiver<BlockSnapshot>,
    recv_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<Sink, CollectorError>
where
    Sink: BlockSink,
{
    while !shutdown.is_cancelled() {
        match tokio::time::timeout(recv_timeout, rx.recv()).await {
            Ok(Some(snapshot)) => {
                if let Err(error) = sink.write(snapshot).await {
                    error!(%error, "failed to persist BlockSnapshot, shutting down");
                    shutdown.cancel();
                    return Err(error);
                }
            }
            Ok(None) => {
                info!("Block snapshot channel closed, stopping sink");
                break;
            }
            Err(_elapsed) => continue,
        }
    }

    Ok(sink)
}
