use std::sync::Arc;
use std::task::{Context, Poll, ready};

use sluice_error::{DbError, ErrorKind, Result};

use super::RowsIterator;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::io::RowsInput;
use crate::relational::{Column, Row};
use crate::scalar::ScalarValue;
use crate::session::CancellationToken;
use crate::statistics::ExecutionStatistics;

/// Adapts a `RowsInput` to a `RowsIterator`.
///
/// This is the only place in a pipeline where cancellation is checked.
#[derive(Debug)]
pub struct RowsInputIterator {
    input: Box<dyn RowsInput>,
    columns: Arc<[Column]>,
    row: Row,
    opened: bool,
    stats: Arc<ExecutionStatistics>,
    cancel: CancellationToken,
}

impl RowsInputIterator {
    pub fn new(
        input: Box<dyn RowsInput>,
        stats: Arc<ExecutionStatistics>,
        cancel: CancellationToken,
    ) -> Self {
        let columns = input.columns().clone();
        let row = Row::new(columns.clone());
        RowsInputIterator {
            input,
            columns,
            row,
            opened: false,
            stats,
            cancel,
        }
    }

    pub fn input(&self) -> &dyn RowsInput {
        self.input.as_ref()
    }

    pub fn close(&mut self) -> Result<()> {
        if self.opened {
            self.opened = false;
            self.input.close()?;
        }
        Ok(())
    }
}

impl RowsIterator for RowsInputIterator {
    fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(Err(DbError::with_kind(
                ErrorKind::Cancelled,
                "Query cancelled",
            )
            .with_field("source", self.input.source_name())));
        }

        if !self.opened {
            self.input.open()?;
            self.opened = true;
        }

        if !ready!(self.input.poll_read_next(cx))? {
            return Poll::Ready(Ok(false));
        }

        for idx in 0..self.columns.len() {
            let value = match self.input.read_value(idx) {
                Ok(v) => v,
                Err(code) => {
                    self.stats.add_error(code);
                    ScalarValue::Null
                }
            };
            self.row.set(idx, value);
        }

        Poll::Ready(Ok(true))
    }

    fn reset(&mut self) -> Result<()> {
        if self.opened {
            self.input.reset()?;
        }
        Ok(())
    }
}

impl Explainable for RowsInputIterator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        self.input.explain_entry(conf)
    }
}
