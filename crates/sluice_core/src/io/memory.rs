use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use sluice_error::{DbError, ErrorKind, Result};

use super::{
    KeyColumn,
    KeyCondition,
    QueryContext,
    RowsInput,
    RowsOutput,
    set_condition,
    unset_condition,
};
use crate::explain::{ExplainConfig, ExplainEntry};
use crate::relational::Column;
use crate::scalar::ScalarValue;
use crate::scalar::ops::BinaryOperator;
use crate::statistics::ErrorCode;

/// Input over an in-memory collection of rows.
///
/// Supports key column push-down by filtering rows as they're read.
#[derive(Debug)]
pub struct MemoryRowsInput {
    name: String,
    arguments: Vec<String>,
    columns: Arc<[Column]>,
    rows: Arc<Vec<Vec<ScalarValue>>>,
    key_columns: Vec<KeyColumn>,
    conditions: Vec<KeyCondition>,
    context: QueryContext,
    opened: bool,
    next: usize,
    current: Option<usize>,
    /// Number of physical row reads, shared so it can be observed after the
    /// input has been moved into a pipeline.
    reads: Arc<AtomicUsize>,
    /// Return Pending once before every read.
    yield_before_read: bool,
    yielded: bool,
    /// Fail with an I/O error once this many rows have been read.
    fail_after: Option<usize>,
    /// Soft errors to report instead of values, as (row, column, code).
    read_errors: Vec<(usize, usize, ErrorCode)>,
}

impl MemoryRowsInput {
    pub fn new(
        name: impl Into<String>,
        columns: Arc<[Column]>,
        rows: impl Into<Arc<Vec<Vec<ScalarValue>>>>,
    ) -> Self {
        MemoryRowsInput {
            name: name.into(),
            arguments: Vec::new(),
            columns,
            rows: rows.into(),
            key_columns: Vec::new(),
            conditions: Vec::new(),
            context: QueryContext::default(),
            opened: false,
            next: 0,
            current: None,
            reads: Arc::new(AtomicUsize::new(0)),
            yield_before_read: false,
            yielded: false,
            fail_after: None,
            read_errors: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key_column(mut self, key: KeyColumn) -> Self {
        self.key_columns.push(key);
        self
    }

    /// Make every read suspend once before producing a row.
    pub fn with_yielding_reads(mut self) -> Self {
        self.yield_before_read = true;
        self
    }

    pub fn with_failure_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    /// Report `code` when reading `column_idx` of row `row_idx`.
    pub fn with_read_error(mut self, row_idx: usize, column_idx: usize, code: ErrorCode) -> Self {
        self.read_errors.push((row_idx, column_idx, code));
        self
    }

    /// Handle to the read counter.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    pub fn conditions(&self) -> &[KeyCondition] {
        &self.conditions
    }

    pub fn query_context(&self) -> &QueryContext {
        &self.context
    }
}

impl RowsInput for MemoryRowsInput {
    fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    fn open(&mut self) -> Result<()> {
        self.opened = true;
        self.next = 0;
        self.current = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.current = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.next = 0;
        self.current = None;
        Ok(())
    }

    fn poll_read_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        if !self.opened {
            return Poll::Ready(Err(DbError::new("Input not opened")
                .with_field("source", &self.name)));
        }

        if self.yield_before_read && !self.yielded {
            self.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.yielded = false;

        loop {
            if self.next >= self.rows.len() {
                self.current = None;
                return Poll::Ready(Ok(false));
            }

            let idx = self.next;
            self.next += 1;
            let reads = self.reads.fetch_add(1, Ordering::Relaxed) + 1;

            if self.fail_after.is_some_and(|n| reads > n) {
                return Poll::Ready(Err(DbError::with_kind(
                    ErrorKind::Io,
                    "Failed to read from source",
                )
                .with_field("source", &self.name)
                .with_field("row", idx)));
            }

            let row = &self.rows[idx];
            let matches = self
                .conditions
                .iter()
                .all(|cond| row.get(cond.column_index).is_some_and(|v| cond.matches(v)));

            if matches {
                self.current = Some(idx);
                return Poll::Ready(Ok(true));
            }
        }
    }

    fn read_value(&self, column_idx: usize) -> Result<ScalarValue, ErrorCode> {
        let idx = self.current.ok_or(ErrorCode::InvalidArgument)?;
        let error = self
            .read_errors
            .iter()
            .find(|(row, col, _)| *row == idx && *col == column_idx);
        if let Some((_, _, code)) = error {
            return Err(*code);
        }
        self.rows[idx]
            .get(column_idx)
            .cloned()
            .ok_or(ErrorCode::InvalidArgument)
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    fn arguments(&self) -> Vec<String> {
        self.arguments.clone()
    }

    fn key_columns(&self) -> &[KeyColumn] {
        &self.key_columns
    }

    fn set_key_column_value(&mut self, condition: KeyCondition) -> Result<()> {
        let supported = self
            .key_columns
            .iter()
            .any(|k| k.column_index == condition.column_index && k.supports(condition.operator));
        if !supported {
            return Err(DbError::new("Unsupported key column condition")
                .with_field("source", &self.name)
                .with_field("condition", condition));
        }
        set_condition(&mut self.conditions, condition);
        Ok(())
    }

    fn unset_key_column_value(
        &mut self,
        column_index: usize,
        operator: BinaryOperator,
    ) -> Result<()> {
        unset_condition(&mut self.conditions, column_index, operator);
        Ok(())
    }

    fn set_query_context(&mut self, context: QueryContext) {
        self.context = context;
    }

    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let mut ent = ExplainEntry::new("MemoryInput").with_value("source", &self.name);
        if !self.conditions.is_empty() {
            ent = ent.with_values("conditions", &self.conditions);
        }
        ent.with_verbose_value(conf, "rows", self.rows.len())
    }
}

/// Output collecting rows in memory.
#[derive(Debug, Default)]
pub struct MemoryRowsOutput {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<ScalarValue>>,
    pub closed: bool,
}

impl MemoryRowsOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowsOutput for MemoryRowsOutput {
    fn open(&mut self, columns: &[Column]) -> Result<()> {
        self.columns = columns.to_vec();
        self.rows.clear();
        self.closed = false;
        Ok(())
    }

    fn write_values(&mut self, values: &[ScalarValue]) -> Result<()> {
        if self.closed {
            return Err(DbError::new("Output closed"));
        }
        self.rows.push(values.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use futures::future::poll_fn;

    use super::*;
    use crate::relational::schema;
    use crate::scalar::DataType;
    use crate::scalar::ops::BinaryOperator;

    fn input() -> MemoryRowsInput {
        let cols = schema([("id", DataType::Integer), ("name", DataType::String)]);
        let rows = vec![
            vec![1.into(), "a".into()],
            vec![2.into(), "b".into()],
            vec![3.into(), "c".into()],
        ];
        MemoryRowsInput::new("people", cols, rows)
            .with_key_column(KeyColumn::new(0, [BinaryOperator::Equal]))
    }

    fn read_ids(input: &mut MemoryRowsInput) -> Vec<ScalarValue> {
        let mut out = Vec::new();
        while block_on(poll_fn(|cx| input.poll_read_next(cx))).unwrap() {
            out.push(input.read_value(0).unwrap());
        }
        out
    }

    #[test]
    fn read_all_then_reset() {
        let mut input = input();
        input.open().unwrap();
        assert_eq!(3, read_ids(&mut input).len());
        input.reset().unwrap();
        assert_eq!(3, read_ids(&mut input).len());
        assert_eq!(6, input.read_counter().load(Ordering::Relaxed));
    }

    #[test]
    fn key_condition_filters() {
        let mut input = input();
        input
            .set_key_column_value(KeyCondition {
                column_index: 0,
                operator: BinaryOperator::Equal,
                value: 2.into(),
            })
            .unwrap();
        input.open().unwrap();
        assert_eq!(vec![ScalarValue::Integer(2)], read_ids(&mut input));
    }

    #[test]
    fn key_condition_rebinds_value() {
        let mut input = input();
        let cond = |value: i64| KeyCondition {
            column_index: 0,
            operator: BinaryOperator::Equal,
            value: value.into(),
        };

        input.set_key_column_value(cond(1)).unwrap();
        input.open().unwrap();
        assert_eq!(vec![ScalarValue::Integer(1)], read_ids(&mut input));

        input.set_key_column_value(cond(2)).unwrap();
        input.reset().unwrap();
        assert_eq!(vec![ScalarValue::Integer(2)], read_ids(&mut input));
        assert_eq!(1, input.conditions().len());

        input
            .unset_key_column_value(0, BinaryOperator::Equal)
            .unwrap();
        input.reset().unwrap();
        assert_eq!(3, read_ids(&mut input).len());
    }

    #[test]
    fn read_error_reported() {
        let mut input = input().with_read_error(1, 1, ErrorCode::CannotCast);
        input.open().unwrap();
        assert!(block_on(poll_fn(|cx| input.poll_read_next(cx))).unwrap());
        assert_eq!(Ok("a".into()), input.read_value(1));
        assert!(block_on(poll_fn(|cx| input.poll_read_next(cx))).unwrap());
        assert_eq!(Ok(2.into()), input.read_value(0));
        assert_eq!(Err(ErrorCode::CannotCast), input.read_value(1));
    }

    #[test]
    fn unsupported_key_condition() {
        let mut input = input();
        input
            .set_key_column_value(KeyCondition {
                column_index: 1,
                operator: BinaryOperator::Equal,
                value: "a".into(),
            })
            .unwrap_err();
    }

    #[test]
    fn read_before_open_errors() {
        let mut input = input();
        block_on(poll_fn(|cx| input.poll_read_next(cx))).unwrap_err();
    }
}
