//! Evaluator units produced by code generation.
//!
//! A unit computes one value from the current row. Soft failures from the
//! operator table or functions are recorded in the shared statistics and the
//! unit yields null instead.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::explain::DisplayList;
use crate::functions::ScalarFunctionImpl;
use crate::relational::Row;
use crate::scalar::cast::try_cast;
use crate::scalar::ops::{BinaryOperator, LikePattern, UnaryOperator, between, compare, in_list};
use crate::scalar::{DataType, ScalarValue};
use crate::statistics::{ErrorCode, ExecutionStatistics};

pub trait EvalUnit: fmt::Display + fmt::Debug + Send + Sync {
    fn eval(&self, row: &Row) -> ScalarValue;

    /// Type declared during resolution.
    fn datatype(&self) -> DataType;
}

pub type UnitRef = Arc<dyn EvalUnit>;

/// Evaluate a list of units against the same row.
pub fn eval_all(units: &[UnitRef], row: &Row) -> Vec<ScalarValue> {
    units.iter().map(|u| u.eval(row)).collect()
}

fn soft(stats: &ExecutionStatistics, result: Result<ScalarValue, ErrorCode>) -> ScalarValue {
    match result {
        Ok(v) => v,
        Err(code) => {
            stats.add_error(code);
            ScalarValue::Null
        }
    }
}

#[derive(Debug)]
pub struct LiteralUnit {
    pub value: ScalarValue,
}

impl LiteralUnit {
    pub fn new(value: ScalarValue) -> Self {
        LiteralUnit { value }
    }
}

impl EvalUnit for LiteralUnit {
    fn eval(&self, _row: &Row) -> ScalarValue {
        self.value.clone()
    }

    fn datatype(&self) -> DataType {
        self.value.datatype()
    }
}

impl fmt::Display for LiteralUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ScalarValue::String(s) => write!(f, "'{s}'"),
            v => write!(f, "{v}"),
        }
    }
}

#[derive(Debug)]
pub struct ColumnUnit {
    pub index: usize,
    pub datatype: DataType,
}

impl EvalUnit for ColumnUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        row.get(self.index).cloned().unwrap_or_default()
    }

    fn datatype(&self) -> DataType {
        self.datatype
    }
}

impl fmt::Display for ColumnUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Debug)]
pub struct BinaryUnit {
    pub op: BinaryOperator,
    pub left: UnitRef,
    pub right: UnitRef,
    pub datatype: DataType,
    pub stats: Arc<ExecutionStatistics>,
}

impl EvalUnit for BinaryUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        let left = self.left.eval(row);
        let right = self.right.eval(row);
        soft(&self.stats, self.op.apply(&left, &right))
    }

    fn datatype(&self) -> DataType {
        self.datatype
    }
}

impl fmt::Display for BinaryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op, self.right)
    }
}

/// AND/OR, skipping the right side when the left decides the result.
#[derive(Debug)]
pub struct LogicalUnit {
    pub op: BinaryOperator,
    pub left: UnitRef,
    pub right: UnitRef,
    pub stats: Arc<ExecutionStatistics>,
}

impl EvalUnit for LogicalUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        let left = self.left.eval(row);
        match (self.op, &left) {
            (BinaryOperator::And, ScalarValue::Boolean(false)) => return left,
            (BinaryOperator::Or, ScalarValue::Boolean(true)) => return left,
            _ => (),
        }
        let right = self.right.eval(row);
        soft(&self.stats, self.op.apply(&left, &right))
    }

    fn datatype(&self) -> DataType {
        DataType::Boolean
    }
}

impl fmt::Display for LogicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op, self.right)
    }
}

/// LIKE with the last compiled pattern kept around.
///
/// Patterns are usually literals so the regex is built once.
#[derive(Debug)]
pub struct LikeUnit {
    pub negated: bool,
    pub value: UnitRef,
    pub pattern: UnitRef,
    pub stats: Arc<ExecutionStatistics>,
    compiled: Mutex<Option<LikePattern>>,
}

impl LikeUnit {
    pub fn new(
        negated: bool,
        value: UnitRef,
        pattern: UnitRef,
        stats: Arc<ExecutionStatistics>,
    ) -> Self {
        LikeUnit {
            negated,
            value,
            pattern,
            stats,
            compiled: Mutex::new(None),
        }
    }

    fn matches(&self, value: &str, pattern: &str) -> Result<bool, ErrorCode> {
        let mut compiled = self.compiled.lock();
        match compiled.as_ref() {
            Some(p) if p.pattern() == pattern => Ok(p.is_match(value)),
            _ => {
                let p = LikePattern::new(pattern)?;
                let matched = p.is_match(value);
                *compiled = Some(p);
                Ok(matched)
            }
        }
    }
}

impl EvalUnit for LikeUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        let value = self.value.eval(row);
        let pattern = self.pattern.eval(row);
        let result = match (&value, &pattern) {
            (ScalarValue::Null, _) | (_, ScalarValue::Null) => Ok(ScalarValue::Null),
            (ScalarValue::String(v), ScalarValue::String(p)) => self
                .matches(v, p)
                .map(|m| ScalarValue::Boolean(m != self.negated)),
            _ => Err(ErrorCode::NotSupported),
        };
        soft(&self.stats, result)
    }

    fn datatype(&self) -> DataType {
        DataType::Boolean
    }
}

impl fmt::Display for LikeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.negated { "NOT " } else { "" };
        write!(f, "({} {not}LIKE {})", self.value, self.pattern)
    }
}

#[derive(Debug)]
pub struct UnaryUnit {
    pub op: UnaryOperator,
    pub operand: UnitRef,
    pub datatype: DataType,
    pub stats: Arc<ExecutionStatistics>,
}

impl EvalUnit for UnaryUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        let v = self.operand.eval(row);
        soft(&self.stats, self.op.apply(&v))
    }

    fn datatype(&self) -> DataType {
        self.datatype
    }
}

impl fmt::Display for UnaryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                write!(f, "{} {}", self.operand, self.op)
            }
            op => write!(f, "{op} {}", self.operand),
        }
    }
}

#[derive(Debug)]
pub struct BetweenUnit {
    pub value: UnitRef,
    pub low: UnitRef,
    pub high: UnitRef,
    pub negated: bool,
    pub stats: Arc<ExecutionStatistics>,
}

impl EvalUnit for BetweenUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        let result = between(&self.value.eval(row), &self.low.eval(row), &self.high.eval(row))
            .and_then(|v| {
                if self.negated {
                    UnaryOperator::Not.apply(&v)
                } else {
                    Ok(v)
                }
            });
        soft(&self.stats, result)
    }

    fn datatype(&self) -> DataType {
        DataType::Boolean
    }
}

impl fmt::Display for BetweenUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.negated { "NOT " } else { "" };
        write!(f, "{} {not}BETWEEN {} AND {}", self.value, self.low, self.high)
    }
}

#[derive(Debug)]
pub struct InListUnit {
    pub value: UnitRef,
    pub list: Vec<UnitRef>,
    pub negated: bool,
    pub stats: Arc<ExecutionStatistics>,
}

impl EvalUnit for InListUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        let value = self.value.eval(row);
        let items = eval_all(&self.list, row);
        let result = in_list(&value, &items).and_then(|v| {
            if self.negated {
                UnaryOperator::Not.apply(&v)
            } else {
                Ok(v)
            }
        });
        soft(&self.stats, result)
    }

    fn datatype(&self) -> DataType {
        DataType::Boolean
    }
}

impl fmt::Display for InListUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.negated { "NOT " } else { "" };
        write!(f, "{} {not}IN ({})", self.value, DisplayList(&self.list))
    }
}

/// Searched and simple CASE.
///
/// In the simple form a branch is taken when its WHEN value compares equal
/// to the operand. Nulls never match.
#[derive(Debug)]
pub struct CaseUnit {
    pub operand: Option<UnitRef>,
    pub branches: Vec<(UnitRef, UnitRef)>,
    pub else_unit: Option<UnitRef>,
    pub datatype: DataType,
}

impl EvalUnit for CaseUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        let operand = self.operand.as_ref().map(|u| u.eval(row));
        for (when, then) in &self.branches {
            let w = when.eval(row);
            let taken = match &operand {
                Some(op) => compare(op, &w) == Some(std::cmp::Ordering::Equal),
                None => w.is_true(),
            };
            if taken {
                return then.eval(row);
            }
        }
        match &self.else_unit {
            Some(u) => u.eval(row),
            None => ScalarValue::Null,
        }
    }

    fn datatype(&self) -> DataType {
        self.datatype
    }
}

impl fmt::Display for CaseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CASE")?;
        if let Some(op) = &self.operand {
            write!(f, " {op}")?;
        }
        for (when, then) in &self.branches {
            write!(f, " WHEN {when} THEN {then}")?;
        }
        if let Some(e) = &self.else_unit {
            write!(f, " ELSE {e}")?;
        }
        write!(f, " END")
    }
}

#[derive(Debug)]
pub struct CastUnit {
    pub value: UnitRef,
    pub to: DataType,
    pub stats: Arc<ExecutionStatistics>,
}

impl EvalUnit for CastUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        soft(&self.stats, try_cast(&self.value.eval(row), self.to))
    }

    fn datatype(&self) -> DataType {
        self.to
    }
}

impl fmt::Display for CastUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CAST({} AS {})", self.value, self.to)
    }
}

#[derive(Debug)]
pub struct CoalesceUnit {
    pub items: Vec<UnitRef>,
    pub datatype: DataType,
}

impl EvalUnit for CoalesceUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        for item in &self.items {
            let v = item.eval(row);
            if !v.is_null() {
                return v;
            }
        }
        ScalarValue::Null
    }

    fn datatype(&self) -> DataType {
        self.datatype
    }
}

impl fmt::Display for CoalesceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "COALESCE({})", DisplayList(&self.items))
    }
}

/// Scalar function call with arguments already ordered to match the
/// signature.
pub struct FunctionUnit {
    pub name: &'static str,
    pub function: ScalarFunctionImpl,
    pub args: Vec<UnitRef>,
    pub datatype: DataType,
    pub stats: Arc<ExecutionStatistics>,
}

impl fmt::Debug for FunctionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionUnit")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("datatype", &self.datatype)
            .finish_non_exhaustive()
    }
}

impl EvalUnit for FunctionUnit {
    fn eval(&self, row: &Row) -> ScalarValue {
        let args = eval_all(&self.args, row);
        soft(&self.stats, (self.function)(&args))
    }

    fn datatype(&self) -> DataType {
        self.datatype
    }
}

impl fmt::Display for FunctionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, DisplayList(&self.args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relational::Column;

    fn lit(v: impl Into<ScalarValue>) -> UnitRef {
        Arc::new(LiteralUnit::new(v.into()))
    }

    fn empty_row() -> Row {
        Row::new(Arc::from(Vec::<Column>::new()))
    }

    #[test]
    fn soft_error_yields_null_and_counts() {
        let stats = Arc::new(ExecutionStatistics::new());
        let unit = BinaryUnit {
            op: BinaryOperator::Divide,
            left: lit(1),
            right: lit(0),
            datatype: DataType::Integer,
            stats: stats.clone(),
        };
        assert_eq!(ScalarValue::Null, unit.eval(&empty_row()));
        assert_eq!(1, stats.error_count(ErrorCode::DivideByZero));
    }

    #[test]
    fn logical_short_circuit_skips_errors() {
        let stats = Arc::new(ExecutionStatistics::new());
        let failing: UnitRef = Arc::new(CastUnit {
            value: lit("nope"),
            to: DataType::Boolean,
            stats: stats.clone(),
        });
        let unit = LogicalUnit {
            op: BinaryOperator::And,
            left: lit(false),
            right: failing,
            stats: stats.clone(),
        };
        assert_eq!(ScalarValue::Boolean(false), unit.eval(&empty_row()));
        assert_eq!(0, stats.errors_count());
    }

    #[test]
    fn like_reuses_pattern() {
        let unit = LikeUnit::new(false, lit("hello"), lit("h%o"), Arc::default());
        assert_eq!(ScalarValue::Boolean(true), unit.eval(&empty_row()));
        assert_eq!(ScalarValue::Boolean(true), unit.eval(&empty_row()));
        assert_eq!("('hello' LIKE 'h%o')", unit.to_string());
    }

    #[test]
    fn simple_case_null_never_matches() {
        let unit = CaseUnit {
            operand: Some(lit(ScalarValue::Null)),
            branches: vec![(lit(ScalarValue::Null), lit("matched"))],
            else_unit: Some(lit("else")),
            datatype: DataType::String,
        };
        assert_eq!(ScalarValue::from("else"), unit.eval(&empty_row()));
    }
}
