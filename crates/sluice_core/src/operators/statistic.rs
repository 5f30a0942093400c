use std::sync::Arc;
use std::task::{Context, Poll, ready};

use sluice_error::{DbError, ErrorKind, Result};
use tracing::error;

use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row};
use crate::statistics::ExecutionStatistics;

/// Top of a pipeline. Counts processed rows and aborts once the number of
/// soft errors goes over `max_errors`.
#[derive(Debug)]
pub struct StatisticRowsIterator {
    child: BoxRowsIterator,
    stats: Arc<ExecutionStatistics>,
    max_errors: Option<u64>,
}

impl StatisticRowsIterator {
    pub fn new(
        child: BoxRowsIterator,
        stats: Arc<ExecutionStatistics>,
        max_errors: Option<u64>,
    ) -> Self {
        StatisticRowsIterator {
            child,
            stats,
            max_errors,
        }
    }

    pub fn statistics(&self) -> &Arc<ExecutionStatistics> {
        &self.stats
    }

    fn check_errors(&self) -> Result<()> {
        let Some(max) = self.max_errors else {
            return Ok(());
        };
        let count = self.stats.errors_count();
        if count > max {
            error!(errors = count, max, stats = %self.stats.dump(), "too many row errors");
            return Err(DbError::with_kind(
                ErrorKind::MaxErrors,
                "Maximum number of row errors exceeded",
            )
            .with_field("errors", count)
            .with_field("max_errors", max));
        }
        Ok(())
    }
}

impl RowsIterator for StatisticRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        self.child.columns()
    }

    fn current(&self) -> &Row {
        self.child.current()
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        self.check_errors()?;
        let has_row = ready!(self.child.poll_move_next(cx))?;
        self.check_errors()?;
        if has_row {
            self.stats.add_processed_row();
        }
        Poll::Ready(Ok(has_row))
    }

    fn reset(&mut self) -> Result<()> {
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for StatisticRowsIterator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Statistic");
        let ent = match self.max_errors {
            Some(max) => ent.with_value("max_errors", max),
            None => ent,
        };
        ent.with_verbose_value(conf, "processed", self.stats.processed_rows())
    }
}
