//! Coercion of loosely-typed JSON setting values
//!
//! Browser forms post numbers and booleans as strings, so both shapes are
//! accepted; anything else is rejected with the offending key.

use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

use crate::capture::config::{Resolution, MAX_DIMENSION};
use crate::error::{Error, Result};

pub fn integer(field: &str, value: &Value) -> Result<u32> {
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| Error::invalid(field, format!("expected a non-negative integer, got {}", value)))
}

pub fn ranged(field: &str, value: &Value, min: u32, max: u32) -> Result<u32> {
    let n = integer(field, value)?;
    if (min..=max).contains(&n) {
        Ok(n)
    } else {
        Err(Error::invalid(field, format!("{} outside {}..={}", n, min, max)))
    }
}

pub fn boolean(field: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(Error::invalid(field, format!("expected a boolean, got {}", value))),
    }
}

pub fn string<'a>(field: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::invalid(field, format!("expected a string, got {}", value)))
}

/// `"W,H"` with both sides in `1..=MAX_DIMENSION`
pub fn parse_resolution(s: &str) -> Result<Resolution> {
    let bad = || Error::invalid("resolution", format!("`{}` is not W,H", s));
    let (w, h) = s.split_once(',').ok_or_else(bad)?;
    let width: u32 = w.trim().parse().map_err(|_| bad())?;
    let height: u32 = h.trim().parse().map_err(|_| bad())?;
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::invalid(
            "resolution",
            format!("{}x{} outside 1..={} per side", width, height, MAX_DIMENSION),
        ));
    }
    Ok(Resolution::new(width, height))
}

/// Serde adapter storing a resolution as `"W,H"`
pub mod resolution_csv {
    use super::*;

    pub fn serialize<S: Serializer>(
        resolution: &Resolution,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{},{}", resolution.width, resolution.height))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Resolution, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_resolution(&s).map_err(serde::de::Error::custom)
    }
}
