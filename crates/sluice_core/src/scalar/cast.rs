use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::{DataType, Decimal, ScalarValue};
use crate::statistics::ErrorCode;

/// Try to cast a value to the given type.
///
/// Null casts to null for every target type. `Any` leaves the value as is.
pub fn try_cast(value: &ScalarValue, to: DataType) -> Result<ScalarValue, ErrorCode> {
    use ScalarValue as SV;

    if value.is_null() || to == DataType::Any || value.datatype() == to {
        return Ok(value.clone());
    }

    match to {
        DataType::Null => Ok(SV::Null),
        DataType::Integer => match value {
            SV::Boolean(b) => Ok(SV::Integer(*b as i64)),
            SV::Float(f) => {
                let t = f.trunc();
                if t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                    Ok(SV::Integer(t as i64))
                } else {
                    Err(ErrorCode::Overflow)
                }
            }
            SV::Numeric(d) => d.trunc_i64().map(SV::Integer).ok_or(ErrorCode::Overflow),
            SV::String(s) => s
                .trim()
                .parse::<i64>()
                .map(SV::Integer)
                .map_err(|_| ErrorCode::CannotCast),
            SV::Timestamp(ts) => Ok(SV::Integer(*ts)),
            _ => Err(ErrorCode::CannotCast),
        },
        DataType::Float => match value {
            SV::Boolean(b) => Ok(SV::Float(*b as i64 as f64)),
            SV::Integer(i) => Ok(SV::Float(*i as f64)),
            SV::Numeric(d) => Ok(SV::Float(d.to_f64())),
            SV::String(s) => s
                .trim()
                .parse::<f64>()
                .map(SV::Float)
                .map_err(|_| ErrorCode::CannotCast),
            _ => Err(ErrorCode::CannotCast),
        },
        DataType::Numeric => match value {
            SV::Integer(i) => Ok(SV::Numeric(Decimal::from_i64(*i))),
            SV::Float(f) => Decimal::from_f64(*f)
                .map(SV::Numeric)
                .ok_or(ErrorCode::CannotCast),
            SV::String(s) => s
                .parse::<Decimal>()
                .map(SV::Numeric)
                .map_err(|_| ErrorCode::CannotCast),
            _ => Err(ErrorCode::CannotCast),
        },
        DataType::String => match value {
            SV::Object(obj) => match obj.as_ref() {
                serde_json::Value::String(s) => Ok(SV::String(s.as_str().into())),
                other => Ok(SV::String(other.to_string().into())),
            },
            other => Ok(SV::String(other.to_string().into())),
        },
        DataType::Boolean => match value {
            SV::Integer(i) => Ok(SV::Boolean(*i != 0)),
            SV::String(s) => parse_bool(s).map(SV::Boolean).ok_or(ErrorCode::CannotCast),
            _ => Err(ErrorCode::CannotCast),
        },
        DataType::Timestamp => match value {
            SV::Integer(i) => Ok(SV::Timestamp(*i)),
            SV::String(s) => parse_timestamp(s)
                .map(SV::Timestamp)
                .ok_or(ErrorCode::CannotCast),
            _ => Err(ErrorCode::CannotCast),
        },
        DataType::Object => match value {
            SV::String(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(|v| SV::Object(Arc::new(v)))
                .map_err(|_| ErrorCode::CannotCast),
            SV::Boolean(b) => Ok(SV::Object(Arc::new(serde_json::Value::Bool(*b)))),
            SV::Integer(i) => Ok(SV::Object(Arc::new((*i).into()))),
            SV::Float(f) => serde_json::Number::from_f64(*f)
                .map(|n| SV::Object(Arc::new(serde_json::Value::Number(n))))
                .ok_or(ErrorCode::CannotCast),
            _ => Err(ErrorCode::CannotCast),
        },
        DataType::Interval => Err(ErrorCode::NotSupported),
        DataType::Any => Ok(value.clone()),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a timestamp string into microseconds since the epoch.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (treated as UTC) and bare
/// dates.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_micros());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_micros());
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_micros())
}
