use std::sync::Arc;
use std::task::{Context, Poll};

use sluice_error::Result;

use super::RowsIterator;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::relational::{Column, Row};
use crate::scalar::ScalarValue;

/// Iterator that never produces a row.
#[derive(Debug)]
pub struct EmptyRowsIterator {
    columns: Arc<[Column]>,
    row: Row,
}

impl EmptyRowsIterator {
    pub fn new(columns: Arc<[Column]>) -> Self {
        let row = Row::new(columns.clone());
        EmptyRowsIterator { columns, row }
    }
}

impl RowsIterator for EmptyRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, _cx: &mut Context) -> Poll<Result<bool>> {
        Poll::Ready(Ok(false))
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Explainable for EmptyRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Empty")
    }
}

/// Iterator producing exactly one row with a single value.
#[derive(Debug)]
pub struct SingleValueRowsIterator {
    columns: Arc<[Column]>,
    row: Row,
    done: bool,
}

impl SingleValueRowsIterator {
    pub fn new(name: impl Into<String>, value: ScalarValue) -> Self {
        let columns: Arc<[Column]> = vec![Column::new(name, value.datatype())].into();
        let row = Row::from_values(columns.clone(), vec![value]);
        SingleValueRowsIterator {
            columns,
            row,
            done: false,
        }
    }
}

impl RowsIterator for SingleValueRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, _cx: &mut Context) -> Poll<Result<bool>> {
        if self.done {
            return Poll::Ready(Ok(false));
        }
        self.done = true;
        Poll::Ready(Ok(true))
    }

    fn reset(&mut self) -> Result<()> {
        self.done = false;
        Ok(())
    }
}

impl Explainable for SingleValueRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("SingleValue").with_value("value", &self.row[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;

    #[test]
    fn single_value_rearms_on_reset() {
        let mut iter = SingleValueRowsIterator::new("v", 7.into());
        assert_eq!(vec![vec![ScalarValue::Integer(7)]], collect_rows_blocking(&mut iter).unwrap());
        assert!(collect_rows_blocking(&mut iter).unwrap().is_empty());

        iter.reset().unwrap();
        assert_eq!(1, collect_rows_blocking(&mut iter).unwrap().len());
    }
}
