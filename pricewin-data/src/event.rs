use crate::error::AggregationError;
use derive_more::From;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// Loosely typed market event as delivered by a producer (live feed or poller).
///
/// The schema is exchange defined. The only field the core relies on is the `"e"` event type
/// tag, everything else is extracted by the [`EventNormalizer`](crate::normalizer::EventNormalizer).
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, From)]
#[serde(transparent)]
pub struct RawEvent(pub serde_json::Value);

impl RawEvent {
    /// Event type tag (`"e"`), if present and a string.
    pub fn tag(&self) -> Option<&str> {
        self.0.get("e").and_then(serde_json::Value::as_str)
    }
}

impl Display for RawEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of event types understood by the aggregation core.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum EventKind {
    AggTrade,
    ForceOrder,
    OpenInterest,
    DepthUpdate,
    Kline,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::AggTrade,
        EventKind::ForceOrder,
        EventKind::OpenInterest,
        EventKind::DepthUpdate,
        EventKind::Kline,
    ];

    /// Wire tag carried in the `"e"` field of a [`RawEvent`].
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AggTrade => "aggTrade",
            EventKind::ForceOrder => "forceOrder",
            EventKind::OpenInterest => "openInterest",
            EventKind::DepthUpdate => "depthUpdate",
            EventKind::Kline => "kline",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Side of a forced liquidation order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse an exchange side token, eg/ "SELL", "Sell", "buy".
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("sell") {
            Some(Side::Sell)
        } else if token.eq_ignore_ascii_case("buy") {
            Some(Side::Buy)
        } else {
            None
        }
    }
}

/// Aggregated trade.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct AggTrade {
    pub symbol: SmolStr,
    pub price: f64,
    pub quantity: f64,
    pub is_buyer_maker: bool,
}

/// Forced liquidation order.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ForceOrder {
    pub symbol: SmolStr,
    pub price: f64,
    pub side: Side,
    pub quantity: f64,
}

/// Open interest reading.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OpenInterest {
    pub symbol: SmolStr,
    pub value: f64,
}

/// Price/quantity level of an order book side.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Level {
    pub price: f64,
    pub quantity: f64,
}

impl From<(f64, f64)> for Level {
    fn from((price, quantity): (f64, f64)) -> Self {
        Self { price, quantity }
    }
}

/// Incremental order book update. Carried through but not aggregated.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct DepthUpdate {
    pub symbol: SmolStr,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Candle update. Carried through but not aggregated.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Kline {
    pub symbol: SmolStr,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: u64,
    pub quote_volume: f64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
    /// Which sixth of the candle (0..=5) the event time falls in.
    pub candle_segment: u8,
}

/// Number of equal segments a candle is split into for [`Kline::candle_segment`].
pub const KLINE_SEGMENTS: usize = 6;

impl Kline {
    /// Position of `event_time` within the candle `[open_time, close_time]`, split into
    /// [`KLINE_SEGMENTS`] equal segments. A degenerate candle is always segment 0.
    ///
    /// Returns `None` if the timestamps are too far apart to be represented.
    pub fn segment_of(event_time: i64, open_time: i64, close_time: i64) -> Option<u8> {
        let segments = KLINE_SEGMENTS as i64;
        let segment_len = close_time.checked_sub(open_time)? / segments;
        if segment_len <= 0 {
            return Some(0);
        }

        let elapsed = event_time.checked_sub(open_time)?.max(0);
        Some((elapsed / segment_len).min(segments - 1) as u8)
    }

    /// One-hot encoding of [`Self::candle_segment`].
    pub fn segment_one_hot(&self) -> [u8; KLINE_SEGMENTS] {
        let mut one_hot = [0; KLINE_SEGMENTS];
        one_hot[usize::from(self.candle_segment).min(KLINE_SEGMENTS - 1)] = 1;
        one_hot
    }
}

/// Normalised market event consumed by the aggregation core.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, From)]
pub enum NormalizedEvent {
    AggTrade(AggTrade),
    ForceOrder(ForceOrder),
    OpenInterest(OpenInterest),
    DepthUpdate(DepthUpdate),
    Kline(Kline),
}

impl NormalizedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NormalizedEvent::AggTrade(_) => EventKind::AggTrade,
            NormalizedEvent::ForceOrder(_) => EventKind::ForceOrder,
            NormalizedEvent::OpenInterest(_) => EventKind::OpenInterest,
            NormalizedEvent::DepthUpdate(_) => EventKind::DepthUpdate,
            NormalizedEvent::Kline(_) => EventKind::Kline,
        }
    }

    pub fn symbol(&self) -> &SmolStr {
        match self {
            NormalizedEvent::AggTrade(trade) => &trade.symbol,
            NormalizedEvent::ForceOrder(order) => &order.symbol,
            NormalizedEvent::OpenInterest(oi) => &oi.symbol,
            NormalizedEvent::DepthUpdate(depth) => &depth.symbol,
            NormalizedEvent::Kline(kline) => &kline.symbol,
        }
    }

    /// Traded price used to route the event to a bucket.
    ///
    /// Open interest, depth and kline events carry no traded price and are routed to the
    /// last active bucket instead.
    pub fn price(&self) -> Option<f64> {
        match self {
            NormalizedEvent::AggTrade(trade) => Some(trade.price),
            NormalizedEvent::ForceOrder(order) => Some(order.price),
            NormalizedEvent::OpenInterest(_)
            | NormalizedEvent::DepthUpdate(_)
            | NormalizedEvent::Kline(_) => None,
        }
    }

    /// Check the numeric fields the aggregation core relies upon, so that a bad record is
    /// rejected before any bucket state is touched.
    pub fn validate(&self) -> Result<(), AggregationError> {
        let kind = self.kind();
        let check_price = |price: f64| {
            if price.is_finite() && price > 0.0 {
                Ok(())
            } else {
                Err(AggregationError::record(
                    kind,
                    format!("invalid price: {price}"),
                ))
            }
        };
        let check_amount = |field: &str, amount: f64| {
            if amount.is_finite() && amount >= 0.0 {
                Ok(())
            } else {
                Err(AggregationError::record(
                    kind,
                    format!("invalid {field}: {amount}"),
                ))
            }
        };

        match self {
            NormalizedEvent::AggTrade(trade) => {
                check_price(trade.price)?;
                check_amount("quantity", trade.quantity)
            }
            NormalizedEvent::ForceOrder(order) => {
                check_price(order.price)?;
                check_amount("quantity", order.quantity)
            }
            NormalizedEvent::OpenInterest(oi) => check_amount("open interest", oi.value),
            NormalizedEvent::DepthUpdate(_) | NormalizedEvent::Kline(_) => Ok(()),
        }
    }
}
