//! Normalisation of raw exchange payloads into [`NormalizedEvent`]s.
//!
//! Dispatch is purely on the `"e"` event type tag. Each recognised [`EventKind`] is decoded via
//! its Binance USDⓈ-M futures wire model, so a missing or malformed required field surfaces as
//! a recoverable [`AggregationError::Record`] for that single event.

use crate::{
    de::{de_str, de_str_levels, de_str_or_f64},
    error::AggregationError,
    event::{
        AggTrade, DepthUpdate, EventKind, ForceOrder, Kline, Level, NormalizedEvent,
        OpenInterest, RawEvent, Side,
    },
};
use serde::{Deserialize, de::DeserializeOwned};
use smol_str::SmolStr;

/// Maps [`RawEvent`]s to [`NormalizedEvent`]s. Stateless.
#[derive(Copy, Clone, Debug, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalise a single [`RawEvent`].
    ///
    /// Unrecognised or absent tags yield [`AggregationError::UnrecognisedEvent`], a missing or
    /// malformed field of a recognised tag yields [`AggregationError::Record`].
    pub fn normalize(&self, raw: &RawEvent) -> Result<NormalizedEvent, AggregationError> {
        let tag = raw
            .tag()
            .ok_or_else(|| AggregationError::UnrecognisedEvent("<missing>".to_string()))?;

        let kind = EventKind::from_tag(tag)
            .ok_or_else(|| AggregationError::UnrecognisedEvent(tag.to_string()))?;

        let event = match kind {
            EventKind::AggTrade => decode::<BinanceAggTrade>(kind, raw)?.into(),
            EventKind::ForceOrder => decode::<BinanceForceOrder>(kind, raw)?.try_into_event()?,
            EventKind::OpenInterest => decode::<BinanceOpenInterest>(kind, raw)?.into(),
            EventKind::DepthUpdate => decode::<BinanceDepthUpdate>(kind, raw)?.into(),
            EventKind::Kline => decode::<BinanceKline>(kind, raw)?.try_into_event()?,
        };

        event.validate()?;
        Ok(event)
    }
}

fn decode<T>(kind: EventKind, raw: &RawEvent) -> Result<T, AggregationError>
where
    T: DeserializeOwned,
{
    T::deserialize(&raw.0).map_err(|error| AggregationError::record(kind, error.to_string()))
}

fn normalise_symbol(symbol: &str) -> SmolStr {
    SmolStr::new(symbol.to_lowercase())
}

/// Binance aggregated trade.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Aggregate-Trade-Streams>
#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceAggTrade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p", deserialize_with = "de_str")]
    price: f64,
    #[serde(rename = "q", deserialize_with = "de_str")]
    quantity: f64,
    #[serde(rename = "m")]
    is_buyer_maker: bool,
}

impl From<BinanceAggTrade> for NormalizedEvent {
    fn from(trade: BinanceAggTrade) -> Self {
        NormalizedEvent::AggTrade(AggTrade {
            symbol: normalise_symbol(&trade.symbol),
            price: trade.price,
            quantity: trade.quantity,
            is_buyer_maker: trade.is_buyer_maker,
        })
    }
}

/// Binance liquidation order snapshot.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Liquidation-Order-Streams>
#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceForceOrder {
    #[serde(rename = "o")]
    order: BinanceForceOrderInner,
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceForceOrderInner {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p", deserialize_with = "de_str")]
    price: f64,
    #[serde(rename = "S")]
    side: String,
    #[serde(rename = "q", deserialize_with = "de_str")]
    quantity: f64,
}

impl BinanceForceOrder {
    fn try_into_event(self) -> Result<NormalizedEvent, AggregationError> {
        let BinanceForceOrderInner {
            symbol,
            price,
            side,
            quantity,
        } = self.order;

        let side = Side::from_token(&side).ok_or_else(|| {
            AggregationError::record(EventKind::ForceOrder, format!("invalid side: {side}"))
        })?;

        Ok(NormalizedEvent::ForceOrder(ForceOrder {
            symbol: normalise_symbol(&symbol),
            price,
            side,
            quantity,
        }))
    }
}

/// Polled open interest, wrapped by the poller as `{"e": "openInterest", "oi": <response>}`.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Open-Interest>
#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceOpenInterest {
    oi: BinanceOpenInterestInner,
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceOpenInterestInner {
    symbol: String,
    #[serde(rename = "openInterest", deserialize_with = "de_str_or_f64")]
    open_interest: f64,
}

impl From<BinanceOpenInterest> for NormalizedEvent {
    fn from(oi: BinanceOpenInterest) -> Self {
        NormalizedEvent::OpenInterest(OpenInterest {
            symbol: normalise_symbol(&oi.oi.symbol),
            value: oi.oi.open_interest,
        })
    }
}

/// Binance diff book depth update.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Diff-Book-Depth-Streams>
#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceDepthUpdate {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b", deserialize_with = "de_str_levels")]
    bids: Vec<(f64, f64)>,
    #[serde(rename = "a", deserialize_with = "de_str_levels")]
    asks: Vec<(f64, f64)>,
}

impl From<BinanceDepthUpdate> for NormalizedEvent {
    fn from(depth: BinanceDepthUpdate) -> Self {
        NormalizedEvent::DepthUpdate(DepthUpdate {
            symbol: normalise_symbol(&depth.symbol),
            bids: depth.bids.into_iter().map(Level::from).collect(),
            asks: depth.asks.into_iter().map(Level::from).collect(),
        })
    }
}

/// Binance kline / candlestick update.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Kline-Candlestick-Streams>
#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceKline {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "k")]
    kline: BinanceKlineInner,
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
struct BinanceKlineInner {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o", deserialize_with = "de_str")]
    open: f64,
    #[serde(rename = "c", deserialize_with = "de_str")]
    close: f64,
    #[serde(rename = "h", deserialize_with = "de_str")]
    high: f64,
    #[serde(rename = "l", deserialize_with = "de_str")]
    low: f64,
    #[serde(rename = "v", deserialize_with = "de_str")]
    volume: f64,
    #[serde(rename = "n")]
    trade_count: u64,
    #[serde(rename = "q", deserialize_with = "de_str")]
    quote_volume: f64,
    #[serde(rename = "V", deserialize_with = "de_str")]
    taker_buy_base_volume: f64,
    #[serde(rename = "Q", deserialize_with = "de_str")]
    taker_buy_quote_volume: f64,
}

impl BinanceKline {
    fn try_into_event(self) -> Result<NormalizedEvent, AggregationError> {
        let BinanceKline { event_time, kline } = self;

        let candle_segment = Kline::segment_of(event_time, kline.open_time, kline.close_time)
            .ok_or_else(|| {
                AggregationError::record(
                    EventKind::Kline,
                    format!(
                        "invalid candle times: event {event_time}, open {}, close {}",
                        kline.open_time, kline.close_time
                    ),
                )
            })?;

        Ok(NormalizedEvent::Kline(Kline {
            symbol: normalise_symbol(&kline.symbol),
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
            trade_count: kline.trade_count,
            quote_volume: kline.quote_volume,
            taker_buy_base_volume: kline.taker_buy_base_volume,
            taker_buy_quote_volume: kline.taker_buy_quote_volume,
            candle_segment,
        }))
    }
}
