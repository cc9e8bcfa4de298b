//! Exported [`Block`](crate::block::Block) state and its flattened row representation.

use crate::{block::BucketKey, interval::IntervalSnapshot};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Per-bucket column prefixes of a flattened [`BlockSnapshot`] row, suffixed w/ the 1-based
/// bucket index.
pub const BUCKET_COLUMNS: [&str; 9] = [
    "price", "maker", "taker", "liq_sell", "liq_buy", "oi_open", "oi_high", "oi_low", "oi_close",
];

/// Immutable snapshot of a completed [`Block`](crate::block::Block), handed to the sink by value.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BlockSnapshot {
    pub symbol: SmolStr,
    pub interval_size: f64,
    pub max_intervals: usize,
    /// Buckets in insertion order.
    pub buckets: IndexMap<BucketKey, IntervalSnapshot>,
}

impl BlockSnapshot {
    /// Header of a flattened row: `symbol` followed by [`BUCKET_COLUMNS`] for every bucket index
    /// `1..=max_intervals`.
    pub fn columns(max_intervals: usize) -> Vec<String> {
        std::iter::once("symbol".to_string())
            .chain((1..=max_intervals).flat_map(|index| {
                BUCKET_COLUMNS
                    .iter()
                    .map(move |column| format!("{column}_{index}"))
            }))
            .collect()
    }

    /// Flatten into a single row matching [`Self::columns`].
    ///
    /// Buckets that were never opened and unset open interest components are empty cells.
    pub fn to_record(&self) -> Vec<String> {
        let buckets = self
            .buckets
            .iter()
            .map(Some)
            .pad_using(self.max_intervals, |_| None)
            .flat_map(|bucket| match bucket {
                Some((key, interval)) => bucket_cells(key, interval),
                None => vec![String::new(); BUCKET_COLUMNS.len()],
            });

        std::iter::once(self.symbol.to_string())
            .chain(buckets)
            .collect()
    }
}

fn bucket_cells(key: &BucketKey, interval: &IntervalSnapshot) -> Vec<String> {
    let optional = |value: Option<f64>| value.map(|value| value.to_string()).unwrap_or_default();
    let oi = &interval.open_interest;

    vec![
        key.to_string(),
        interval.maker_volume.to_string(),
        interval.taker_volume.to_string(),
        interval.liquidations.sell_volume.to_string(),
        interval.liquidations.buy_volume.to_string(),
        optional(oi.open),
        optional(oi.high),
        optional(oi.low),
        optional(oi.close),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{Liquidations, OpenInterestOhlc};

    #[test]
    fn test_columns() {
        let columns = BlockSnapshot::columns(2);

        assert_eq!(columns.len(), 1 + 2 * BUCKET_COLUMNS.len());
        assert_eq!(columns[0], "symbol");
        assert_eq!(columns[1], "price_1");
        assert_eq!(columns[9], "oi_close_1");
        assert_eq!(columns[10], "price_2");
        assert_eq!(columns[18], "oi_close_2");
    }

    #[test]
    fn test_to_record_pads_missing_buckets() {
        let snapshot = BlockSnapshot {
            symbol: SmolStr::new("btcusdt"),
            interval_size: 10.0,
            max_intervals: 2,
            buckets: IndexMap::from([(
                BucketKey::from(20.0),
                IntervalSnapshot {
                    maker_volume: 1.5,
                    taker_volume: 2.0,
                    liquidations: Liquidations {
                        sell_volume: 0.5,
                        buy_volume: 0.0,
                    },
                    open_interest: OpenInterestOhlc {
                        open: Some(100.0),
                        high: Some(120.0),
                        low: Some(80.0),
                        close: Some(90.0),
                    },
                },
            )]),
        };

        let record = snapshot.to_record();

        assert_eq!(record.len(), BlockSnapshot::columns(2).len());
        assert_eq!(
            record[..10],
            ["btcusdt", "20", "1.5", "2", "0.5", "0", "100", "120", "80", "90"]
        );
        assert!(record[10..].iter().all(String::is_empty));
    }

    #[test]
    fn test_to_record_unset_open_interest_is_empty() {
        let snapshot = BlockSnapshot {
            symbol: SmolStr::new("ethusdt"),
            interval_size: 1.0,
            max_intervals: 1,
            buckets: IndexMap::from([(BucketKey::from(3000.0), IntervalSnapshot::default())]),
        };

        let record = snapshot.to_record();
        assert_eq!(record[1], "3000");
        assert!(record[6..].iter().all(String::is_empty));
    }
}
