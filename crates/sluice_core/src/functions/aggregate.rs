use std::cmp::Ordering;
use std::fmt::Debug;

use super::{FunctionArgument, FunctionRegistry, Signature};
use crate::scalar::cast::try_cast;
use crate::scalar::ops::{BinaryOperator, compare};
use crate::scalar::{DataType, ScalarValue};
use crate::statistics::ErrorCode;

/// An aggregate function.
///
/// State is an opaque array of values owned by the caller, one per group (or
/// per window frame).
pub trait AggregateFunction: Send + Sync + Debug {
    /// State before any rows have been seen.
    fn initial_state(&self, return_type: DataType) -> Vec<ScalarValue>;

    /// Fold one row's arguments into the state.
    fn invoke(&self, state: &mut [ScalarValue], args: &[ScalarValue]) -> Result<(), ErrorCode>;

    /// Produce the final value from the state.
    fn result(&self, state: &[ScalarValue]) -> ScalarValue;
}

pub fn register_builtins(registry: &mut FunctionRegistry) {
    registry.register_aggregate(
        Signature::new("count", Vec::new(), DataType::Integer),
        "Count the number of rows.",
        Count,
    );
    registry.register_aggregate(
        Signature::new(
            "count",
            [FunctionArgument::required("value", DataType::Any)],
            DataType::Integer,
        ),
        "Count the number of non-null values.",
        Count,
    );
    registry.register_aggregate(
        Signature::new(
            "sum",
            [FunctionArgument::required("value", DataType::Any)],
            DataType::Any,
        ),
        "Sum of all non-null values.",
        Sum,
    );
    registry.register_aggregate(
        Signature::new(
            "avg",
            [FunctionArgument::required("value", DataType::Any)],
            DataType::Float,
        ),
        "Average of all non-null values.",
        Avg,
    );
    registry.register_aggregate(
        Signature::new(
            "min",
            [FunctionArgument::required("value", DataType::Any)],
            DataType::Any,
        ),
        "Smallest non-null value.",
        MinMax {
            keep: Ordering::Less,
        },
    );
    registry.register_aggregate(
        Signature::new(
            "max",
            [FunctionArgument::required("value", DataType::Any)],
            DataType::Any,
        ),
        "Largest non-null value.",
        MinMax {
            keep: Ordering::Greater,
        },
    );
    registry.register_aggregate(
        Signature::new(
            "string_agg",
            [
                FunctionArgument::required("value", DataType::String),
                FunctionArgument::optional("delimiter", DataType::String, ",".into()),
            ],
            DataType::String,
        ),
        "Concatenate non-null values, separated by a delimiter.",
        StringAgg,
    );
}

#[derive(Debug, Clone, Copy)]
pub struct Count;

impl AggregateFunction for Count {
    fn initial_state(&self, _return_type: DataType) -> Vec<ScalarValue> {
        vec![ScalarValue::Integer(0)]
    }

    fn invoke(&self, state: &mut [ScalarValue], args: &[ScalarValue]) -> Result<(), ErrorCode> {
        // No arguments counts every row.
        if args.first().is_some_and(|v| v.is_null()) {
            return Ok(());
        }
        if let ScalarValue::Integer(n) = &mut state[0] {
            *n += 1;
        }
        Ok(())
    }

    fn result(&self, state: &[ScalarValue]) -> ScalarValue {
        state[0].clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl AggregateFunction for Sum {
    fn initial_state(&self, _return_type: DataType) -> Vec<ScalarValue> {
        vec![ScalarValue::Null]
    }

    fn invoke(&self, state: &mut [ScalarValue], args: &[ScalarValue]) -> Result<(), ErrorCode> {
        let value = &args[0];
        if value.is_null() {
            return Ok(());
        }
        state[0] = if state[0].is_null() {
            value.clone()
        } else {
            BinaryOperator::Add.apply(&state[0], value)?
        };
        Ok(())
    }

    fn result(&self, state: &[ScalarValue]) -> ScalarValue {
        state[0].clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Avg;

impl AggregateFunction for Avg {
    fn initial_state(&self, _return_type: DataType) -> Vec<ScalarValue> {
        vec![ScalarValue::Null, ScalarValue::Integer(0)]
    }

    fn invoke(&self, state: &mut [ScalarValue], args: &[ScalarValue]) -> Result<(), ErrorCode> {
        let value = &args[0];
        if value.is_null() {
            return Ok(());
        }
        let sum = if state[0].is_null() {
            value.clone()
        } else {
            BinaryOperator::Add.apply(&state[0], value)?
        };
        state[0] = sum;
        if let ScalarValue::Integer(n) = &mut state[1] {
            *n += 1;
        }
        Ok(())
    }

    fn result(&self, state: &[ScalarValue]) -> ScalarValue {
        let count = match &state[1] {
            ScalarValue::Integer(n) if *n > 0 => *n,
            _ => return ScalarValue::Null,
        };
        match try_cast(&state[0], DataType::Float) {
            Ok(ScalarValue::Float(sum)) => ScalarValue::Float(sum / count as f64),
            _ => ScalarValue::Null,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinMax {
    /// Replace the state when the new value compares this way against it.
    keep: Ordering,
}

impl AggregateFunction for MinMax {
    fn initial_state(&self, _return_type: DataType) -> Vec<ScalarValue> {
        vec![ScalarValue::Null]
    }

    fn invoke(&self, state: &mut [ScalarValue], args: &[ScalarValue]) -> Result<(), ErrorCode> {
        let value = &args[0];
        if value.is_null() {
            return Ok(());
        }
        if state[0].is_null() {
            state[0] = value.clone();
            return Ok(());
        }
        match compare(value, &state[0]) {
            Some(ord) if ord == self.keep => state[0] = value.clone(),
            Some(_) => (),
            None => return Err(ErrorCode::NotSupported),
        }
        Ok(())
    }

    fn result(&self, state: &[ScalarValue]) -> ScalarValue {
        state[0].clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StringAgg;

impl AggregateFunction for StringAgg {
    fn initial_state(&self, _return_type: DataType) -> Vec<ScalarValue> {
        vec![ScalarValue::Null]
    }

    fn invoke(&self, state: &mut [ScalarValue], args: &[ScalarValue]) -> Result<(), ErrorCode> {
        let value = match &args[0] {
            ScalarValue::Null => return Ok(()),
            ScalarValue::String(s) => s.clone(),
            other => other.to_string().into(),
        };
        let next = match &state[0] {
            ScalarValue::String(acc) => {
                let delim = match args.get(1) {
                    Some(ScalarValue::String(d)) => d.as_ref(),
                    _ => "",
                };
                format!("{acc}{delim}{value}").into()
            }
            _ => value,
        };
        state[0] = ScalarValue::String(next);
        Ok(())
    }

    fn result(&self, state: &[ScalarValue]) -> ScalarValue {
        state[0].clone()
    }
}
