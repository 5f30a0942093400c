//! Leaf adapters at the pipeline boundary.
//!
//! A `RowsInput` produces rows from some external source (a file parser, a
//! log format, an in-memory collection). A `RowsOutput` consumes rows at the
//! end of a pipeline. Concrete format adapters live outside of this crate.

pub mod memory;

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use sluice_error::{DbError, Result};

use crate::explain::{ExplainConfig, ExplainEntry};
use crate::relational::Column;
use crate::scalar::ScalarValue;
use crate::scalar::ops::BinaryOperator;
use crate::statistics::ErrorCode;

/// A column the input can filter on natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub column_index: usize,
    /// If the input cannot produce rows without a value for this column.
    pub required: bool,
    /// Operators the input supports for this column.
    pub operators: Vec<BinaryOperator>,
}

impl KeyColumn {
    pub fn new(column_index: usize, operators: impl Into<Vec<BinaryOperator>>) -> Self {
        KeyColumn {
            column_index,
            required: false,
            operators: operators.into(),
        }
    }

    pub fn supports(&self, op: BinaryOperator) -> bool {
        self.operators.contains(&op)
    }
}

/// A condition pushed down into an input through a key column.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub column_index: usize,
    pub operator: BinaryOperator,
    pub value: ScalarValue,
}

impl KeyCondition {
    /// Check a value against this condition. Nulls and incomparable values
    /// never match.
    pub fn matches(&self, value: &ScalarValue) -> bool {
        self.operator
            .apply(value, &self.value)
            .map(|v| v.is_true())
            .unwrap_or(false)
    }
}

/// Set `condition` in a list of conditions, replacing any condition on the
/// same column with the same operator.
pub fn set_condition(conditions: &mut Vec<KeyCondition>, condition: KeyCondition) {
    let existing = conditions
        .iter_mut()
        .find(|c| c.column_index == condition.column_index && c.operator == condition.operator);
    match existing {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

/// Remove the condition on `column_index` with `operator`. Returns false if
/// there wasn't one.
pub fn unset_condition(
    conditions: &mut Vec<KeyCondition>,
    column_index: usize,
    operator: BinaryOperator,
) -> bool {
    let len = conditions.len();
    conditions.retain(|c| !(c.column_index == column_index && c.operator == operator));
    conditions.len() != len
}

impl fmt::Display for KeyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.column_index, self.operator, self.value)
    }
}

/// What the pipeline will ask of an input.
///
/// Inputs may use this to avoid producing data that will be discarded. The
/// result cache also uses it to build cache keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContext {
    /// Names of columns the query references. Empty means all columns.
    pub columns: Vec<String>,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl QueryContext {
    /// Upper bound on the number of rows the pipeline will read, if known.
    pub fn max_rows(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_add(self.offset))
    }
}

pub trait RowsInput: Send + fmt::Debug {
    fn columns(&self) -> &Arc<[Column]>;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Rewind the input so the next read starts from the first row.
    fn reset(&mut self) -> Result<()>;

    /// Advance to the next row.
    ///
    /// Returns Ready(Ok(false)) once the input is exhausted. May return
    /// Pending while waiting on I/O.
    fn poll_read_next(&mut self, cx: &mut Context) -> Poll<Result<bool>>;

    /// Read a value from the current row.
    fn read_value(&self, column_idx: usize) -> Result<ScalarValue, ErrorCode>;

    /// Name identifying the source, used in explain output and cache keys.
    fn source_name(&self) -> &str;

    /// Arguments the input was constructed with (file path, URL...).
    fn arguments(&self) -> Vec<String> {
        Vec::new()
    }

    fn key_columns(&self) -> &[KeyColumn] {
        &[]
    }

    /// Push a condition down into the input. Takes effect on the next reset
    /// or open.
    ///
    /// Replaces the value of an earlier condition on the same column with
    /// the same operator.
    fn set_key_column_value(&mut self, condition: KeyCondition) -> Result<()> {
        Err(DbError::new("Input does not support key columns")
            .with_field("source", self.source_name())
            .with_field("condition", condition))
    }

    /// Drop a pushed down condition. Takes effect on the next reset or open.
    fn unset_key_column_value(
        &mut self,
        _column_index: usize,
        _operator: BinaryOperator,
    ) -> Result<()> {
        Ok(())
    }

    fn set_query_context(&mut self, _context: QueryContext) {}

    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Input").with_value("source", self.source_name())
    }
}

pub trait RowsOutput: Send {
    fn open(&mut self, columns: &[Column]) -> Result<()>;

    fn write_values(&mut self, values: &[ScalarValue]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}
