pub mod cast;
pub mod datatype;
pub mod decimal;
pub mod ops;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sluice_error::{DbError, Result};

pub use self::datatype::DataType;
pub use self::decimal::Decimal;

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// A calendar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl Interval {
    pub const fn new(months: i32, days: i32, micros: i64) -> Self {
        Interval {
            months,
            days,
            micros,
        }
    }

    /// Approximate length in microseconds, treating a month as 30 days.
    ///
    /// Only used for ordering.
    pub fn approx_micros(&self) -> i128 {
        (self.months as i128 * 30 + self.days as i128) * MICROS_PER_DAY as i128
            + self.micros as i128
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        Some(Interval {
            months: self.months.checked_add(other.months)?,
            days: self.days.checked_add(other.days)?,
            micros: self.micros.checked_add(other.micros)?,
        })
    }

    pub fn checked_neg(&self) -> Option<Self> {
        Some(Interval {
            months: self.months.checked_neg()?,
            days: self.days.checked_neg()?,
            micros: self.micros.checked_neg()?,
        })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months != 0 {
            write!(f, "{} mons ", self.months)?;
        }
        if self.days != 0 {
            write!(f, "{} days ", self.days)?;
        }
        let sign = if self.micros < 0 { "-" } else { "" };
        let total = self.micros.unsigned_abs();
        let secs = total / MICROS_PER_SECOND as u64;
        let frac = total % MICROS_PER_SECOND as u64;
        write!(
            f,
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        )?;
        if frac != 0 {
            write!(f, ".{frac:06}")?;
        }
        Ok(())
    }
}

/// A single runtime value.
#[derive(Debug, Clone, Default)]
pub enum ScalarValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Numeric(Decimal),
    String(Arc<str>),
    /// Microseconds since the unix epoch, UTC.
    Timestamp(i64),
    Interval(Interval),
    Object(Arc<serde_json::Value>),
}

impl ScalarValue {
    pub fn datatype(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Integer(_) => DataType::Integer,
            Self::Float(_) => DataType::Float,
            Self::Numeric(_) => DataType::Numeric,
            Self::String(_) => DataType::String,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::Interval(_) => DataType::Interval,
            Self::Object(_) => DataType::Object,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    pub fn timestamp(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts.timestamp_micros())
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            other => Err(DbError::new("Not a bool").with_field("value", other)),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Integer(i) => Ok(*i),
            Self::Numeric(d) if d.normalize().scale == 0 => d
                .trunc_i64()
                .ok_or_else(|| DbError::new("Numeric out of range for i64")),
            other => Err(DbError::new("Not an integer").with_field("value", other)),
        }
    }

    pub fn try_as_str(&self) -> Result<&str> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(DbError::new("Not a string").with_field("value", other)),
        }
    }

    /// Interpret as a predicate result. Anything other than true is false.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Boolean(true))
    }

    /// Rank of the type when ordering values of incomparable types.
    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Float(_) | Self::Numeric(_) => 2,
            Self::String(_) => 3,
            Self::Timestamp(_) => 4,
            Self::Interval(_) => 5,
            Self::Object(_) => 6,
        }
    }

    /// Total order used for sorting.
    ///
    /// Values of the same family compare naturally. Values that cannot be
    /// compared fall back to a fixed ordering by type. Nulls sort first here,
    /// callers apply their own null placement before reaching this.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            _ => match ops::compare(self, other) {
                Some(ord) => ord,
                None => self.type_rank().cmp(&other.type_rank()),
            },
        }
    }
}

fn normalized_float_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0.0f64.to_bits()
    } else {
        f.to_bits()
    }
}

/// Structural equality. Used for group, distinct and cache keys.
///
/// Null equals Null here. SQL comparison semantics live in `ops`.
impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                normalized_float_bits(*a) == normalized_float_bits(*b)
            }
            (Self::Numeric(a), Self::Numeric(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Interval(a), Self::Interval(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => (),
            Self::Boolean(v) => v.hash(state),
            Self::Integer(v) => v.hash(state),
            Self::Float(v) => normalized_float_bits(*v).hash(state),
            Self::Numeric(v) => v.hash(state),
            Self::String(v) => v.hash(state),
            Self::Timestamp(v) => v.hash(state),
            Self::Interval(v) => v.hash(state),
            Self::Object(v) => v.to_string().hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Numeric(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Timestamp(v) => match DateTime::from_timestamp_micros(*v) {
                Some(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
                None => write!(f, "{v}"),
            },
            Self::Interval(v) => write!(f, "{v}"),
            Self::Object(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Integer(value as i64)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => ScalarValue::Integer(v),
            Err(_) => ScalarValue::Numeric(Decimal::new(value as i128, 0)),
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.into())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value.into())
    }
}

impl From<Decimal> for ScalarValue {
    fn from(value: Decimal) -> Self {
        ScalarValue::Numeric(value)
    }
}

impl From<Interval> for ScalarValue {
    fn from(value: Interval) -> Self {
        ScalarValue::Interval(value)
    }
}

impl From<serde_json::Value> for ScalarValue {
    fn from(value: serde_json::Value) -> Self {
        ScalarValue::Object(Arc::new(value))
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashSet;

    use super::*;

    #[test]
    fn float_keys_normalize_zero_and_nan() {
        let mut set = HashSet::new();
        set.insert(ScalarValue::Float(0.0));
        set.insert(ScalarValue::Float(-0.0));
        set.insert(ScalarValue::Float(f64::NAN));
        set.insert(ScalarValue::Float(f64::NAN));
        assert_eq!(2, set.len());
    }

    #[test]
    fn no_cross_type_equality() {
        assert_ne!(ScalarValue::Integer(1), ScalarValue::Float(1.0));
        assert_ne!(ScalarValue::Null, ScalarValue::Integer(0));
        assert_eq!(ScalarValue::Null, ScalarValue::Null);
    }

    #[test]
    fn total_cmp_across_numeric_family() {
        let a = ScalarValue::Integer(2);
        let b = ScalarValue::Float(2.5);
        assert_eq!(Ordering::Less, a.total_cmp(&b));
        assert_eq!(
            Ordering::Less,
            ScalarValue::Boolean(true).total_cmp(&ScalarValue::from("a"))
        );
    }

    #[test]
    fn display_timestamp_and_interval() {
        let ts = ScalarValue::Timestamp(1_700_000_000 * MICROS_PER_SECOND);
        assert_eq!("2023-11-14 22:13:20", ts.to_string());

        let iv = Interval::new(1, 2, 3_723_000_000);
        assert_eq!("1 mons 2 days 01:02:03", iv.to_string());
    }
}
