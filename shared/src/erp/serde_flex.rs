//! Tolerant deserializers for ERP feed values.
//!
//! The ERP serializes most scalars as strings ("125", "12.5", "") and is not
//! consistent about it across endpoints, so every numeric field goes through
//! one of these helpers. Empty strings and nulls decode to zero/empty rather
//! than failing the whole record.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.replace(',', ".").parse().ok()
            }
        }
        Value::Null => Some(0.0),
        _ => None,
    }
}

/// i64 from a number, a numeric string, an empty string or null.
pub fn i64_flex<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_f64(&value)
        .map(|f| f as i64)
        .ok_or_else(|| serde::de::Error::custom(format!("expected integer-like value, got {value}")))
}

/// i32 counterpart of [`i64_flex`].
pub fn i32_flex<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    i64_flex(deserializer).map(|v| v as i32)
}

/// f64 from a number, a numeric string (either decimal separator) or null.
pub fn f64_flex<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_f64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected float-like value, got {value}")))
}

/// Money in cents from the ERP's decimal representation.
///
/// Goes through [`Decimal`] so that "12.30" becomes 1230 without float
/// rounding surprises.
pub fn cents_flex<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let decimal = match &value {
        Value::Number(n) => Decimal::from_f64_retain(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(Decimal::ZERO)
            } else {
                s.replace(',', ".").parse::<Decimal>().ok()
            }
        }
        Value::Null => Some(Decimal::ZERO),
        _ => None,
    };
    decimal
        .and_then(|d| (d * Decimal::from(100)).round().to_i64())
        .ok_or_else(|| serde::de::Error::custom(format!("expected money value, got {value}")))
}

/// String from a string, number or null (numbers are stringified).
pub fn string_flex<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string-like value, got {other}"
        ))),
    }
}
