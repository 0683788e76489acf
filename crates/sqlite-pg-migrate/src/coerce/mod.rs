//! Value coercion from SQLite's dynamic storage classes to the category a
//! PostgreSQL column demands.
//!
//! [`coerce`] is pure and total: anything it cannot convert becomes NULL
//! (numeric and boolean targets) or passes through unchanged (timestamp text,
//! UUID text, text-like targets). Whether a NULL is acceptable is decided by
//! the row projector, not here.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::core::schema::TypeCategory;
use crate::core::value::Value;

/// Convert `value` for a column of `category`.
pub fn coerce(value: &Value, category: TypeCategory) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match category {
        TypeCategory::Boolean => to_bool(value).map_or(Value::Null, Value::Bool),
        TypeCategory::Integer => to_integer(value).map_or(Value::Null, Value::Integer),
        TypeCategory::Numeric => to_decimal(value).map_or(Value::Null, Value::Decimal),
        TypeCategory::Float => to_float(value).map_or(Value::Null, Value::Real),
        TypeCategory::Timestamp => to_timestamp(value),
        TypeCategory::Uuid => to_uuid(value),
        TypeCategory::Json | TypeCategory::Text | TypeCategory::Other => value.clone(),
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Integer(i) => Some(*i != 0),
        Value::Real(f) if f.is_finite() => Some(*f != 0.0),
        Value::Decimal(d) => Some(!d.is_zero()),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Boolean words accepted by the numeric categories.
fn bool_word(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Integer(i) => Some(*i),
        Value::Real(f) => f64_to_i64(*f),
        Value::Decimal(d) => d.trunc().to_i64(),
        Value::Text(s) => {
            let s = s.trim();
            if let Some(b) = bool_word(s) {
                return Some(i64::from(b));
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| parse_decimal(s).and_then(|d| d.trunc().to_i64()))
                .or_else(|| s.parse::<f64>().ok().and_then(f64_to_i64))
        }
        _ => None,
    }
}

fn f64_to_i64(f: f64) -> Option<i64> {
    let t = f.trunc();
    if t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Bool(b) => Some(Decimal::from(i64::from(*b))),
        Value::Integer(i) => Some(Decimal::from(*i)),
        Value::Real(f) if f.is_finite() => Decimal::try_from(*f).ok(),
        Value::Decimal(d) => Some(*d),
        Value::Text(s) => {
            let s = s.trim();
            match bool_word(s) {
                Some(b) => Some(Decimal::from(i64::from(b))),
                None => parse_decimal(s),
            }
        }
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Integer(i) => Some(*i as f64),
        Value::Real(f) => Some(*f),
        Value::Decimal(d) => d.to_f64(),
        Value::Text(s) => {
            let s = s.trim();
            match bool_word(s) {
                Some(b) => Some(if b { 1.0 } else { 0.0 }),
                None => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    }?;
    f.is_finite().then_some(f)
}

/// Epoch milliseconds to RFC 3339 in UTC with millisecond precision.
fn epoch_millis_to_iso(ms: i64) -> Value {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| Value::Text(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .unwrap_or(Value::Null)
}

fn to_timestamp(value: &Value) -> Value {
    match value {
        Value::Integer(ms) => epoch_millis_to_iso(*ms),
        Value::Real(f) => f64_to_i64(*f).map_or(Value::Null, epoch_millis_to_iso),
        Value::Decimal(d) => d.trunc().to_i64().map_or(Value::Null, epoch_millis_to_iso),
        Value::Text(s) => {
            let t = s.trim();
            if let Ok(ms) = t.parse::<i64>() {
                epoch_millis_to_iso(ms)
            } else if let Ok(f) = t.parse::<f64>() {
                f64_to_i64(f).map_or(Value::Null, epoch_millis_to_iso)
            } else {
                value.clone()
            }
        }
        _ => Value::Null,
    }
}

fn to_uuid(value: &Value) -> Value {
    match value {
        Value::Text(s) => match Uuid::parse_str(s.trim()) {
            Ok(u) => Value::Text(u.hyphenated().to_string()),
            Err(_) => value.clone(),
        },
        Value::Blob(bytes) => match Uuid::from_slice(bytes) {
            Ok(u) => Value::Text(u.hyphenated().to_string()),
            Err(_) => value.clone(),
        },
        _ => value.clone(),
    }
}
