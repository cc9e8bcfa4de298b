//! Serde helpers for the string-encoded numerics used by exchange payloads.

use serde::Deserialize;
use std::{fmt::Display, str::FromStr};

/// Deserialize a `String` as the desired type.
///
/// eg/ `"16578.50"` -> `16578.5_f64`
pub fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::de::Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let data: &str = Deserialize::deserialize(deserializer)?;
    data.parse::<T>().map_err(serde::de::Error::custom)
}

/// Deserialize a JSON value that may be either a numeric string or a number as an `f64`.
///
/// Exchange REST and WebSocket payloads disagree on whether numerics are quoted.
pub fn de_str_or_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numeric {
        Str(String),
        Float(f64),
    }

    match Numeric::deserialize(deserializer)? {
        Numeric::Str(raw) => raw.trim().parse::<f64>().map_err(serde::de::Error::custom),
        Numeric::Float(value) => Ok(value),
    }
}

/// Deserialize a `[["price", "quantity"], ...]` array of book levels as `(f64, f64)` tuples.
pub fn de_str_levels<'de, D>(deserializer: D) -> Result<Vec<(f64, f64)>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let raw: Vec<(String, String)> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(price, quantity)| {
            let price = price.parse::<f64>().map_err(serde::de::Error::custom)?;
            let quantity = quantity.parse::<f64>().map_err(serde::de::Error::custom)?;
            Ok((price, quantity))
        })
        .collect()
}
