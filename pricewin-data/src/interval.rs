use crate::{
    error::AggregationError,
    event::{NormalizedEvent, Side},
};
use serde::{Deserialize, Serialize};

/// Open/high/low/close summary of the open interest readings seen by an [`Interval`].
///
/// Every component starts unset (`None`). A genuine reading of `0.0` is a real sample and is
/// recorded like any other value.
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct OpenInterestOhlc {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

impl OpenInterestOhlc {
    /// Fold a new open interest reading into the summary.
    pub fn update(&mut self, value: f64) {
        self.open.get_or_insert(value);
        self.high = Some(self.high.map_or(value, |high| high.max(value)));
        self.low = Some(self.low.map_or(value, |low| low.min(value)));
        self.close = Some(value);
    }

    pub fn is_unset(&self) -> bool {
        self.close.is_none()
    }
}

/// Liquidated volume split by the side of the forced order.
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Liquidations {
    #[serde(rename = "sell_vol")]
    pub sell_volume: f64,
    #[serde(rename = "buy_vol")]
    pub buy_volume: f64,
}

/// Accumulator for all event statistics falling within one price bucket.
///
/// Owned exclusively by its containing [`Block`](crate::block::Block).
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Interval {
    maker_volume: f64,
    taker_volume: f64,
    liquidations: Liquidations,
    open_interest: OpenInterestOhlc,
}

impl Interval {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a [`NormalizedEvent`] to the accumulator.
    ///
    /// The event is validated before any field is touched, so a rejected event leaves the
    /// [`Interval`] unchanged. Depth and kline events are accepted and ignored.
    pub fn apply(&mut self, event: &NormalizedEvent) -> Result<(), AggregationError> {
        event.validate()?;

        match event {
            NormalizedEvent::AggTrade(trade) => {
                if trade.is_buyer_maker {
                    self.maker_volume += trade.quantity;
                } else {
                    self.taker_volume += trade.quantity;
                }
            }
            NormalizedEvent::ForceOrder(order) => match order.side {
                Side::Sell => self.liquidations.sell_volume += order.quantity,
                Side::Buy => self.liquidations.buy_volume += order.quantity,
            },
            NormalizedEvent::OpenInterest(oi) => self.open_interest.update(oi.value),
            NormalizedEvent::DepthUpdate(_) | NormalizedEvent::Kline(_) => {}
        }

        Ok(())
    }

    pub fn maker_volume(&self) -> f64 {
        self.maker_volume
    }

    pub fn taker_volume(&self) -> f64 {
        self.taker_volume
    }

    pub fn liquidations(&self) -> &Liquidations {
        &self.liquidations
    }

    pub fn open_interest(&self) -> &OpenInterestOhlc {
        &self.open_interest
    }

    /// Immutable copy of the accumulated state.
    pub fn snapshot(&self) -> IntervalSnapshot {
        IntervalSnapshot {
            maker_volume: self.maker_volume,
            taker_volume: self.taker_volume,
            liquidations: self.liquidations,
            open_interest: self.open_interest,
        }
    }
}

/// Exported state of an [`Interval`], handed to the sink inside a
/// [`BlockSnapshot`](crate::snapshot::BlockSnapshot).
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct IntervalSnapshot {
    pub maker_volume: f64,
    pub taker_volume: f64,
    pub liquidations: Liquidations,
    pub open_interest: OpenInterestOhlc,
}
