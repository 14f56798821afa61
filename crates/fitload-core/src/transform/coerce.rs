use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use super::rules::{round_to, ColumnRule};
use crate::table::{Cell, ColumnType};

/// Outcome of coercing one raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Value(Cell),
    /// A value was present but could not be converted; it is stored as null.
    Failed,
}

/// Converts a raw JSON value into a typed cell per `rule`. Missing values and
/// JSON null are plain nulls, not failures.
pub fn coerce(value: Option<&Value>, rule: &ColumnRule) -> Coerced {
    let coerced = match value {
        None | Some(Value::Null) => Coerced::Value(Cell::Null),
        Some(value) => match coerce_value(value, rule.column_type) {
            Some(cell) => Coerced::Value(cell),
            None => Coerced::Failed,
        },
    };

    match coerced {
        Coerced::Value(Cell::Float(v)) => {
            let v = rule.scale.map_or(v, |factor| v * factor);
            let v = rule.round.map_or(v, |digits| round_to(v, digits));
            Coerced::Value(Cell::Float(v))
        }
        Coerced::Value(Cell::Null) if rule.column_type == ColumnType::Text => {
            Coerced::Value(rule.fill.map_or(Cell::Null, |f| Cell::Text(f.to_string())))
        }
        other => other,
    }
}

fn coerce_value(value: &Value, column_type: ColumnType) -> Option<Cell> {
    if let Value::String(text) = value {
        if text.trim().is_empty() {
            return Some(Cell::Null);
        }
    }

    match column_type {
        ColumnType::Text => Some(Cell::Text(match value {
            Value::String(text) => text.trim().to_string(),
            other => other.to_string(),
        })),
        ColumnType::Integer => to_i64(value).map(Cell::Integer),
        ColumnType::Float => to_f64(value).map(Cell::Float),
        ColumnType::Boolean => to_bool(value).map(Cell::Boolean),
        ColumnType::Timestamp => to_timestamp(value).map(Cell::Timestamp),
        ColumnType::Date => to_date(value).map(Cell::Date),
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn integral(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64).then_some(v as i64)
}

fn to_f64(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Numbers (and digit-only strings) are epoch milliseconds, the unit the
/// exports use for `*Timestamp*`/`startTime*` fields.
pub fn to_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|v| v.round() as i64))?;
            from_millis(millis)
        }
        Value::String(text) => parse_timestamp(text.trim()),
        _ => None,
    }
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if !text.is_empty() && text.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) {
        return text.parse::<i64>().ok().and_then(from_millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn to_date(value: &Value) -> Option<NaiveDate> {
    if let Value::String(text) = value {
        if let Ok(date) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
            return Some(date);
        }
    }
    to_timestamp(value).map(|ts| ts.date())
}

fn from_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}
