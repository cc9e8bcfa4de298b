//! Bounded set of concurrently tracked price buckets for one symbol.

use crate::{
    error::AggregationError,
    event::NormalizedEvent,
    interval::Interval,
    snapshot::BlockSnapshot,
};
use derive_more::Display;
use indexmap::{IndexMap, map::Entry};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
};

/// Floor of the price range a bucket represents, eg/ `20.0` for `[20, 30)` w/ an interval
/// size of `10`.
///
/// Equality and hashing are bitwise on the (negative zero normalised) floor value.
#[derive(Copy, Clone, Debug, Display, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BucketKey(f64);

impl BucketKey {
    /// Bucket key for `price` given the bucket width `interval_size`.
    pub fn for_price(price: f64, interval_size: f64) -> Self {
        Self::from((price / interval_size).floor() * interval_size)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for BucketKey {
    fn from(value: f64) -> Self {
        // -0.0 and 0.0 name the same bucket
        Self(if value == 0.0 { 0.0 } else { value })
    }
}

impl PartialEq for BucketKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for BucketKey {}

impl Hash for BucketKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for BucketKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BucketKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Mapping of [`BucketKey`] to [`Interval`] w/ a hard cap on the number of open buckets.
///
/// Buckets are kept in insertion order and are never removed; the whole [`Block`] is replaced
/// on rollover.
#[derive(Clone, Debug)]
pub struct Block {
    symbol: SmolStr,
    interval_size: f64,
    max_intervals: usize,
    buckets: IndexMap<BucketKey, Interval>,
    last_active_key: Option<BucketKey>,
}

impl Block {
    pub fn new(symbol: impl Into<SmolStr>, interval_size: f64, max_intervals: usize) -> Self {
        Self {
            symbol: symbol.into(),
            interval_size,
            max_intervals,
            buckets: IndexMap::with_capacity(max_intervals),
            last_active_key: None,
        }
    }

    /// Construct an empty [`Block`] w/ the same symbol and layout as this one.
    pub fn fresh(&self) -> Self {
        Self::new(self.symbol.clone(), self.interval_size, self.max_intervals)
    }

    pub fn bucket_key_for(&self, price: f64) -> BucketKey {
        BucketKey::for_price(price, self.interval_size)
    }

    /// True if `price` falls into an existing bucket, or there is room to open a new one.
    ///
    /// False signals that a rollover is required before `price` can be recorded.
    pub fn is_trackable(&self, price: f64) -> bool {
        self.buckets.contains_key(&self.bucket_key_for(price))
            || self.buckets.len() < self.max_intervals
    }

    /// Route a [`NormalizedEvent`] to its bucket and apply it.
    ///
    /// With a price, the bucket for that price is opened if required and becomes the last
    /// active bucket. Without a price, the event is applied to the last active bucket, or
    /// rejected w/ [`AggregationError::PricelessRoutingMiss`] if no bucket has been active yet.
    ///
    /// Opening a bucket beyond `max_intervals` yields a terminal
    /// [`AggregationError::CapacityViolation`]; callers must check [`Self::is_trackable`] and
    /// roll over first.
    pub fn route_and_apply(
        &mut self,
        event: &NormalizedEvent,
        price: Option<f64>,
    ) -> Result<(), AggregationError> {
        event.validate()?;

        let Some(price) = price else {
            let interval = self
                .last_active_key
                .and_then(|key| self.buckets.get_mut(&key))
                .ok_or_else(|| AggregationError::PricelessRoutingMiss {
                    symbol: self.symbol.clone(),
                })?;
            return interval.apply(event);
        };

        let key = self.bucket_key_for(price);
        let open_buckets = self.buckets.len();
        let interval = match self.buckets.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) if open_buckets < self.max_intervals => {
                entry.insert(Interval::new())
            }
            Entry::Vacant(_) => {
                return Err(AggregationError::CapacityViolation {
                    key,
                    max_intervals: self.max_intervals,
                });
            }
        };

        interval.apply(event)?;
        self.last_active_key = Some(key);
        Ok(())
    }

    /// Immutable, insertion ordered snapshot of every bucket. Does not mutate the [`Block`].
    pub fn export(&self) -> BlockSnapshot {
        BlockSnapshot {
            symbol: self.symbol.clone(),
            interval_size: self.interval_size,
            max_intervals: self.max_intervals,
            buckets: self
                .buckets
                .iter()
                .map(|(key, interval)| (*key, interval.snapshot()))
                .collect(),
        }
    }

    pub fn symbol(&self) -> &SmolStr {
        &self.symbol
    }

    pub fn max_intervals(&self) -> usize {
        self.max_intervals
    }

    pub fn last_active_key(&self) -> Option<BucketKey> {
        self.last_active_key
    }

    pub fn get(&self, key: &BucketKey) -> Option<&Interval> {
        self.buckets.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &BucketKey> {
        self.buckets.keys()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
