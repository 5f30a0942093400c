//! Operator table for scalar values.
//!
//! `result_type` is the static half of the table used during compilation,
//! `apply` the dynamic half used per row. Failures during `apply` are soft
//! and reported as an `ErrorCode`.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Months};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{DataType, Decimal, Interval, ScalarValue};
use crate::statistics::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
    Like,
    NotLike,
    Concat,
}

impl BinaryOperator {
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::LessOrEqual
                | Self::Greater
                | Self::GreaterOrEqual
        )
    }

    pub const fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulo
        )
    }

    /// Get the result type of applying this operator to the given types.
    ///
    /// Returns None if the operator cannot be applied.
    pub fn result_type(&self, left: DataType, right: DataType) -> Option<DataType> {
        use DataType as DT;

        match self {
            Self::And | Self::Or => match (left, right) {
                (DT::Boolean | DT::Null | DT::Any, DT::Boolean | DT::Null | DT::Any) => {
                    Some(DT::Boolean)
                }
                _ => None,
            },
            Self::Like | Self::NotLike => match (left, right) {
                (DT::String | DT::Null | DT::Any, DT::String | DT::Null | DT::Any) => {
                    Some(DT::Boolean)
                }
                _ => None,
            },
            Self::Concat => match (left, right) {
                (DT::Object, _) | (_, DT::Object) => None,
                _ => Some(DT::String),
            },
            op if op.is_comparison() => {
                let wildcard = |t: DataType| matches!(t, DT::Null | DT::Any);
                if left == right || wildcard(left) || wildcard(right) {
                    return Some(DT::Boolean);
                }
                if left.is_numeric() && right.is_numeric() {
                    return Some(DT::Boolean);
                }
                None
            }
            _ => arithmetic_result_type(*self, left, right),
        }
    }

    /// Apply the operator to two values.
    pub fn apply(&self, left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue, ErrorCode> {
        match self {
            Self::And => return and(left, right),
            Self::Or => return or(left, right),
            _ => (),
        }

        if left.is_null() || right.is_null() {
            return Ok(ScalarValue::Null);
        }

        match self {
            Self::Equal => cmp_op(left, right, |o| o == Ordering::Equal),
            Self::NotEqual => cmp_op(left, right, |o| o != Ordering::Equal),
            Self::Less => cmp_op(left, right, |o| o == Ordering::Less),
            Self::LessOrEqual => cmp_op(left, right, |o| o != Ordering::Greater),
            Self::Greater => cmp_op(left, right, |o| o == Ordering::Greater),
            Self::GreaterOrEqual => cmp_op(left, right, |o| o != Ordering::Less),
            Self::Like | Self::NotLike => {
                let (ScalarValue::String(s), ScalarValue::String(p)) = (left, right) else {
                    return Err(ErrorCode::NotSupported);
                };
                let matched = LikePattern::new(p)?.is_match(s);
                Ok(ScalarValue::Boolean(matched == matches!(self, Self::Like)))
            }
            Self::Concat => Ok(ScalarValue::String(format!("{left}{right}").into())),
            _ => arithmetic(*self, left, right),
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Concat => "||",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Negate,
    Not,
    IsNull,
    IsNotNull,
}

impl UnaryOperator {
    pub fn result_type(&self, operand: DataType) -> Option<DataType> {
        match self {
            Self::IsNull | Self::IsNotNull => Some(DataType::Boolean),
            Self::Not => match operand {
                DataType::Boolean | DataType::Null | DataType::Any => Some(DataType::Boolean),
                _ => None,
            },
            Self::Negate => match operand {
                DataType::Integer
                | DataType::Float
                | DataType::Numeric
                | DataType::Interval
                | DataType::Null
                | DataType::Any => Some(operand),
                _ => None,
            },
        }
    }

    pub fn apply(&self, value: &ScalarValue) -> Result<ScalarValue, ErrorCode> {
        match self {
            Self::IsNull => Ok(ScalarValue::Boolean(value.is_null())),
            Self::IsNotNull => Ok(ScalarValue::Boolean(!value.is_null())),
            Self::Not => match value {
                ScalarValue::Null => Ok(ScalarValue::Null),
                ScalarValue::Boolean(b) => Ok(ScalarValue::Boolean(!b)),
                _ => Err(ErrorCode::NotSupported),
            },
            Self::Negate => match value {
                ScalarValue::Null => Ok(ScalarValue::Null),
                ScalarValue::Integer(v) => {
                    v.checked_neg().map(ScalarValue::Integer).ok_or(ErrorCode::Overflow)
                }
                ScalarValue::Float(v) => Ok(ScalarValue::Float(-v)),
                ScalarValue::Numeric(v) => {
                    v.checked_neg().map(ScalarValue::Numeric).ok_or(ErrorCode::Overflow)
                }
                ScalarValue::Interval(v) => {
                    v.checked_neg().map(ScalarValue::Interval).ok_or(ErrorCode::Overflow)
                }
                _ => Err(ErrorCode::NotSupported),
            },
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Negate => "-",
            Self::Not => "NOT",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        };
        write!(f, "{s}")
    }
}

/// Compare two non-null values.
///
/// Returns None if either value is null, or the values belong to different
/// type families.
pub fn compare(left: &ScalarValue, right: &ScalarValue) -> Option<Ordering> {
    use ScalarValue as SV;

    match (left, right) {
        (SV::Boolean(a), SV::Boolean(b)) => Some(a.cmp(b)),
        (SV::Integer(a), SV::Integer(b)) => Some(a.cmp(b)),
        (SV::Float(a), SV::Float(b)) => a.partial_cmp(b),
        (SV::Numeric(a), SV::Numeric(b)) => Some(a.cmp(b)),
        (SV::Integer(a), SV::Float(b)) => (*a as f64).partial_cmp(b),
        (SV::Float(a), SV::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (SV::Integer(a), SV::Numeric(b)) => Some(Decimal::from_i64(*a).cmp(b)),
        (SV::Numeric(a), SV::Integer(b)) => Some(a.cmp(&Decimal::from_i64(*b))),
        (SV::Numeric(a), SV::Float(b)) => a.to_f64().partial_cmp(b),
        (SV::Float(a), SV::Numeric(b)) => a.partial_cmp(&b.to_f64()),
        (SV::String(a), SV::String(b)) => Some(a.cmp(b)),
        (SV::Timestamp(a), SV::Timestamp(b)) => Some(a.cmp(b)),
        (SV::Interval(a), SV::Interval(b)) => Some(a.approx_micros().cmp(&b.approx_micros())),
        (SV::Object(a), SV::Object(b)) => Some(a.to_string().cmp(&b.to_string())),
        _ => None,
    }
}

fn cmp_op(
    left: &ScalarValue,
    right: &ScalarValue,
    pred: impl Fn(Ordering) -> bool,
) -> Result<ScalarValue, ErrorCode> {
    match compare(left, right) {
        Some(ord) => Ok(ScalarValue::Boolean(pred(ord))),
        None => Err(ErrorCode::NotSupported),
    }
}

/// Three valued AND.
fn and(left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue, ErrorCode> {
    let l = as_tristate(left)?;
    let r = as_tristate(right)?;
    Ok(match (l, r) {
        (Some(false), _) | (_, Some(false)) => ScalarValue::Boolean(false),
        (Some(true), Some(true)) => ScalarValue::Boolean(true),
        _ => ScalarValue::Null,
    })
}

/// Three valued OR.
fn or(left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue, ErrorCode> {
    let l = as_tristate(left)?;
    let r = as_tristate(right)?;
    Ok(match (l, r) {
        (Some(true), _) | (_, Some(true)) => ScalarValue::Boolean(true),
        (Some(false), Some(false)) => ScalarValue::Boolean(false),
        _ => ScalarValue::Null,
    })
}

fn as_tristate(v: &ScalarValue) -> Result<Option<bool>, ErrorCode> {
    match v {
        ScalarValue::Null => Ok(None),
        ScalarValue::Boolean(b) => Ok(Some(*b)),
        _ => Err(ErrorCode::InvalidArgument),
    }
}

fn arithmetic_result_type(op: BinaryOperator, left: DataType, right: DataType) -> Option<DataType> {
    use BinaryOperator as Op;
    use DataType as DT;

    match (left, right) {
        (DT::Any, _) | (_, DT::Any) => Some(DT::Any),
        (DT::Null, DT::Null) => Some(DT::Null),
        (DT::Null, other) | (other, DT::Null) if other.is_numeric() || other == DT::Interval => {
            Some(other)
        }
        (DT::Integer, DT::Integer) => Some(DT::Integer),
        (DT::Float, DT::Float | DT::Integer | DT::Numeric)
        | (DT::Integer | DT::Numeric, DT::Float) => Some(DT::Float),
        (DT::Numeric, DT::Numeric | DT::Integer) | (DT::Integer, DT::Numeric) => {
            Some(DT::Numeric)
        }
        (DT::Timestamp, DT::Interval) if matches!(op, Op::Add | Op::Subtract) => {
            Some(DT::Timestamp)
        }
        (DT::Interval, DT::Timestamp) if op == Op::Add => Some(DT::Timestamp),
        (DT::Timestamp, DT::Timestamp) if op == Op::Subtract => Some(DT::Interval),
        (DT::Interval, DT::Interval) if matches!(op, Op::Add | Op::Subtract) => {
            Some(DT::Interval)
        }
        _ => None,
    }
}

fn arithmetic(
    op: BinaryOperator,
    left: &ScalarValue,
    right: &ScalarValue,
) -> Result<ScalarValue, ErrorCode> {
    use ScalarValue as SV;

    match (left, right) {
        (SV::Integer(a), SV::Integer(b)) => int_arith(op, *a, *b).map(SV::Integer),
        (SV::Float(a), SV::Float(b)) => float_arith(op, *a, *b),
        (SV::Integer(a), SV::Float(b)) => float_arith(op, *a as f64, *b),
        (SV::Float(a), SV::Integer(b)) => float_arith(op, *a, *b as f64),
        (SV::Numeric(a), SV::Float(b)) => float_arith(op, a.to_f64(), *b),
        (SV::Float(a), SV::Numeric(b)) => float_arith(op, *a, b.to_f64()),
        (SV::Numeric(a), SV::Numeric(b)) => decimal_arith(op, a, b),
        (SV::Integer(a), SV::Numeric(b)) => decimal_arith(op, &Decimal::from_i64(*a), b),
        (SV::Numeric(a), SV::Integer(b)) => decimal_arith(op, a, &Decimal::from_i64(*b)),
        (SV::Timestamp(ts), SV::Interval(iv)) => match op {
            BinaryOperator::Add => add_interval(*ts, iv),
            BinaryOperator::Subtract => {
                add_interval(*ts, &iv.checked_neg().ok_or(ErrorCode::Overflow)?)
            }
            _ => Err(ErrorCode::NotSupported),
        },
        (SV::Interval(iv), SV::Timestamp(ts)) if op == BinaryOperator::Add => {
            add_interval(*ts, iv)
        }
        (SV::Timestamp(a), SV::Timestamp(b)) if op == BinaryOperator::Subtract => {
            let micros = a.checked_sub(*b).ok_or(ErrorCode::Overflow)?;
            Ok(SV::Interval(Interval::new(0, 0, micros)))
        }
        (SV::Interval(a), SV::Interval(b)) => match op {
            BinaryOperator::Add => a.checked_add(b).map(SV::Interval).ok_or(ErrorCode::Overflow),
            BinaryOperator::Subtract => b
                .checked_neg()
                .and_then(|nb| a.checked_add(&nb))
                .map(SV::Interval)
                .ok_or(ErrorCode::Overflow),
            _ => Err(ErrorCode::NotSupported),
        },
        _ => Err(ErrorCode::NotSupported),
    }
}

fn int_arith(op: BinaryOperator, a: i64, b: i64) -> Result<i64, ErrorCode> {
    let v = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Subtract => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::Divide => {
            if b == 0 {
                return Err(ErrorCode::DivideByZero);
            }
            a.checked_div(b)
        }
        BinaryOperator::Modulo => {
            if b == 0 {
                return Err(ErrorCode::DivideByZero);
            }
            a.checked_rem(b)
        }
        _ => return Err(ErrorCode::NotSupported),
    };
    v.ok_or(ErrorCode::Overflow)
}

fn float_arith(op: BinaryOperator, a: f64, b: f64) -> Result<ScalarValue, ErrorCode> {
    let v = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => {
            if b == 0.0 {
                return Err(ErrorCode::DivideByZero);
            }
            a / b
        }
        BinaryOperator::Modulo => {
            if b == 0.0 {
                return Err(ErrorCode::DivideByZero);
            }
            a % b
        }
        _ => return Err(ErrorCode::NotSupported),
    };
    Ok(ScalarValue::Float(v))
}

fn decimal_arith(op: BinaryOperator, a: &Decimal, b: &Decimal) -> Result<ScalarValue, ErrorCode> {
    let v = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Subtract => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::Divide => {
            if b.value == 0 {
                return Err(ErrorCode::DivideByZero);
            }
            a.checked_div(b)
        }
        BinaryOperator::Modulo => {
            if b.value == 0 {
                return Err(ErrorCode::DivideByZero);
            }
            a.checked_rem(b)
        }
        _ => return Err(ErrorCode::NotSupported),
    };
    v.map(ScalarValue::Numeric).ok_or(ErrorCode::Overflow)
}

fn add_interval(ts: i64, iv: &Interval) -> Result<ScalarValue, ErrorCode> {
    let mut dt = DateTime::from_timestamp_micros(ts).ok_or(ErrorCode::Overflow)?;
    if iv.months > 0 {
        dt = dt
            .checked_add_months(Months::new(iv.months as u32))
            .ok_or(ErrorCode::Overflow)?;
    } else if iv.months < 0 {
        dt = dt
            .checked_sub_months(Months::new(iv.months.unsigned_abs()))
            .ok_or(ErrorCode::Overflow)?;
    }
    let micros = (iv.days as i64)
        .checked_mul(super::MICROS_PER_DAY)
        .and_then(|d| d.checked_add(iv.micros))
        .and_then(|d| dt.timestamp_micros().checked_add(d))
        .ok_or(ErrorCode::Overflow)?;
    Ok(ScalarValue::Timestamp(micros))
}

/// `value BETWEEN low AND high`, with three valued logic.
pub fn between(
    value: &ScalarValue,
    low: &ScalarValue,
    high: &ScalarValue,
) -> Result<ScalarValue, ErrorCode> {
    let ge = BinaryOperator::GreaterOrEqual.apply(value, low)?;
    let le = BinaryOperator::LessOrEqual.apply(value, high)?;
    and(&ge, &le)
}

/// `value IN (list...)`.
///
/// True if any non-null list item equals the value. Otherwise null if the
/// value or any item is null, false if not.
pub fn in_list<'a>(
    value: &ScalarValue,
    list: impl IntoIterator<Item = &'a ScalarValue>,
) -> Result<ScalarValue, ErrorCode> {
    if value.is_null() {
        return Ok(ScalarValue::Null);
    }
    let mut saw_null = false;
    for item in list {
        if item.is_null() {
            saw_null = true;
            continue;
        }
        if compare(value, item) == Some(Ordering::Equal) {
            return Ok(ScalarValue::Boolean(true));
        }
    }
    if saw_null {
        Ok(ScalarValue::Null)
    } else {
        Ok(ScalarValue::Boolean(false))
    }
}

/// Compiled LIKE pattern. `%` matches any sequence, `_` a single character.
#[derive(Debug, Clone)]
pub struct LikePattern {
    pattern: String,
    regex: Regex,
}

impl LikePattern {
    pub fn new(pattern: &str) -> Result<Self, ErrorCode> {
        let mut re = String::with_capacity(pattern.len() + 8);
        re.push_str("(?s)^");
        let mut buf = [0u8; 4];
        for c in pattern.chars() {
            match c {
                '%' => re.push_str(".*"),
                '_' => re.push('.'),
                other => re.push_str(&regex::escape(other.encode_utf8(&mut buf))),
            }
        }
        re.push('$');
        let regex = Regex::new(&re).map_err(|_| ErrorCode::InvalidArgument)?;
        Ok(LikePattern {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_types() {
        use DataType as DT;
        assert_eq!(
            Some(DT::Integer),
            BinaryOperator::Add.result_type(DT::Integer, DT::Integer)
        );
        assert_eq!(
            Some(DT::Float),
            BinaryOperator::Multiply.result_type(DT::Integer, DT::Float)
        );
        assert_eq!(
            Some(DT::Timestamp),
            BinaryOperator::Add.result_type(DT::Timestamp, DT::Interval)
        );
        assert_eq!(None, BinaryOperator::Add.result_type(DT::String, DT::Integer));
        assert_eq!(None, BinaryOperator::Less.result_type(DT::String, DT::Integer));
        assert_eq!(
            Some(DT::Boolean),
            BinaryOperator::Equal.result_type(DT::Null, DT::String)
        );
    }

    #[test]
    fn null_propagation() {
        let out = BinaryOperator::Add
            .apply(&ScalarValue::Integer(1), &ScalarValue::Null)
            .unwrap();
        assert_eq!(ScalarValue::Null, out);
    }

    #[test]
    fn three_valued_logic() {
        let t = ScalarValue::Boolean(true);
        let f = ScalarValue::Boolean(false);
        let n = ScalarValue::Null;

        assert_eq!(f, BinaryOperator::And.apply(&n, &f).unwrap());
        assert_eq!(n, BinaryOperator::And.apply(&n, &t).unwrap());
        assert_eq!(t, BinaryOperator::Or.apply(&n, &t).unwrap());
        assert_eq!(n, BinaryOperator::Or.apply(&n, &f).unwrap());
        assert_eq!(n, UnaryOperator::Not.apply(&n).unwrap());
    }

    #[test]
    fn soft_errors() {
        assert_eq!(
            Err(ErrorCode::DivideByZero),
            BinaryOperator::Divide.apply(&ScalarValue::Integer(1), &ScalarValue::Integer(0))
        );
        assert_eq!(
            Err(ErrorCode::Overflow),
            BinaryOperator::Add.apply(&ScalarValue::Integer(i64::MAX), &ScalarValue::Integer(1))
        );
        assert_eq!(
            Err(ErrorCode::NotSupported),
            BinaryOperator::Less.apply(&ScalarValue::from("a"), &ScalarValue::Integer(1))
        );
    }

    #[test]
    fn mixed_numeric_compare() {
        let out = BinaryOperator::Less
            .apply(&ScalarValue::Integer(2), &ScalarValue::Float(2.5))
            .unwrap();
        assert_eq!(ScalarValue::Boolean(true), out);
    }

    #[test]
    fn timestamp_plus_interval() {
        let ts = ScalarValue::Timestamp(0);
        let out = BinaryOperator::Add
            .apply(&ts, &ScalarValue::Interval(Interval::new(1, 1, 0)))
            .unwrap();
        // 1970-02-02
        assert_eq!(ScalarValue::Timestamp(32 * super::super::MICROS_PER_DAY), out);
    }

    #[test]
    fn like_patterns() {
        let p = LikePattern::new("a%c_").unwrap();
        assert!(p.is_match("abbbcd"));
        assert!(!p.is_match("abbbc"));
        assert!(LikePattern::new("1.5%").unwrap().is_match("1.50"));
        assert!(!LikePattern::new("1.5%").unwrap().is_match("105"));
    }

    #[test]
    fn in_list_nulls() {
        let one = ScalarValue::Integer(1);
        let two = ScalarValue::Integer(2);
        let null = ScalarValue::Null;

        assert_eq!(ScalarValue::Boolean(true), in_list(&one, [&null, &one]).unwrap());
        assert_eq!(ScalarValue::Null, in_list(&two, [&null, &one]).unwrap());
        assert_eq!(ScalarValue::Boolean(false), in_list(&two, [&one]).unwrap());
    }

    #[test]
    fn between_inclusive() {
        let v = ScalarValue::Integer(5);
        let out = between(&v, &ScalarValue::Integer(5), &ScalarValue::Integer(10)).unwrap();
        assert_eq!(ScalarValue::Boolean(true), out);
    }
}
