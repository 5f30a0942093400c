use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use sluice_error::Result;

use super::RowsIterator;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::relational::{Column, Row};

type RowMapper<T> = Box<dyn Fn(&T, &mut Row) + Send + Sync>;

/// Iterator over a collection of arbitrary items, mapping each item into a
/// row.
pub struct EnumerableRowsIterator<T> {
    columns: Arc<[Column]>,
    items: Arc<[T]>,
    mapper: RowMapper<T>,
    row: Row,
    next: usize,
}

impl<T> EnumerableRowsIterator<T>
where
    T: Send + Sync + 'static,
{
    pub fn new<F>(columns: Arc<[Column]>, items: impl Into<Arc<[T]>>, mapper: F) -> Self
    where
        F: Fn(&T, &mut Row) + Send + Sync + 'static,
    {
        let row = Row::new(columns.clone());
        EnumerableRowsIterator {
            columns,
            items: items.into(),
            mapper: Box::new(mapper),
            row,
            next: 0,
        }
    }
}

impl<T> fmt::Debug for EnumerableRowsIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumerableRowsIterator")
            .field("columns", &self.columns)
            .field("items", &self.items.len())
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

impl<T> RowsIterator for EnumerableRowsIterator<T>
where
    T: Send + Sync + 'static,
{
    fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, _cx: &mut Context) -> Poll<Result<bool>> {
        let Some(item) = self.items.get(self.next) else {
            return Poll::Ready(Ok(false));
        };
        (self.mapper)(item, &mut self.row);
        self.next += 1;
        Poll::Ready(Ok(true))
    }

    fn reset(&mut self) -> Result<()> {
        self.next = 0;
        Ok(())
    }
}

impl<T> Explainable for EnumerableRowsIterator<T> {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Enumerable").with_verbose_value(conf, "items", self.items.len())
    }
}
