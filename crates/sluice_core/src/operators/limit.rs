use std::sync::Arc;
use std::task::{Context, Poll, ready};

use sluice_error::Result;

use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row};

/// Returns at most `limit` rows. Once reached the child isn't pulled again
/// until a reset.
#[derive(Debug)]
pub struct LimitRowsIterator {
    child: BoxRowsIterator,
    limit: u64,
    emitted: u64,
}

impl LimitRowsIterator {
    pub fn new(child: BoxRowsIterator, limit: u64) -> Self {
        LimitRowsIterator {
            child,
            limit,
            emitted: 0,
        }
    }
}

impl RowsIterator for LimitRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        self.child.columns()
    }

    fn current(&self) -> &Row {
        self.child.current()
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        if self.emitted >= self.limit {
            return Poll::Ready(Ok(false));
        }
        let has_row = ready!(self.child.poll_move_next(cx))?;
        if has_row {
            self.emitted += 1;
        }
        Poll::Ready(Ok(has_row))
    }

    fn reset(&mut self) -> Result<()> {
        self.emitted = 0;
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for LimitRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Limit").with_value("count", self.limit)
    }
}

/// Discards the first `offset` rows.
#[derive(Debug)]
pub struct OffsetRowsIterator {
    child: BoxRowsIterator,
    offset: u64,
    skipped: u64,
}

impl OffsetRowsIterator {
    pub fn new(child: BoxRowsIterator, offset: u64) -> Self {
        OffsetRowsIterator {
            child,
            offset,
            skipped: 0,
        }
    }
}

impl RowsIterator for OffsetRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        self.child.columns()
    }

    fn current(&self) -> &Row {
        self.child.current()
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        while self.skipped < self.offset {
            if !ready!(self.child.poll_move_next(cx))? {
                self.skipped = self.offset;
                return Poll::Ready(Ok(false));
            }
            self.skipped += 1;
        }
        self.child.poll_move_next(cx)
    }

    fn reset(&mut self) -> Result<()> {
        self.skipped = 0;
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for OffsetRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Offset").with_value("count", self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;
    use crate::scalar::ScalarValue;
    use crate::testutil::ints;

    fn values(rows: Vec<Vec<ScalarValue>>) -> Vec<i64> {
        rows.into_iter()
            .map(|r| r[0].try_as_i64().unwrap())
            .collect()
    }

    #[test]
    fn limit_rearms_on_reset() {
        let mut iter = LimitRowsIterator::new(ints("a", (1..=5).map(Some)), 2);
        assert_eq!(vec![1, 2], values(collect_rows_blocking(&mut iter).unwrap()));
        assert!(collect_rows_blocking(&mut iter).unwrap().is_empty());

        iter.reset().unwrap();
        assert_eq!(vec![1, 2], values(collect_rows_blocking(&mut iter).unwrap()));
    }

    #[test]
    fn offset_then_limit() {
        let offset = OffsetRowsIterator::new(ints("a", (1..=5).map(Some)), 3);
        let mut iter = LimitRowsIterator::new(Box::new(offset), 10);
        assert_eq!(vec![4, 5], values(collect_rows_blocking(&mut iter).unwrap()));
    }

    #[test]
    fn offset_past_end() {
        let mut iter = OffsetRowsIterator::new(ints("a", [Some(1)]), 4);
        assert!(collect_rows_blocking(&mut iter).unwrap().is_empty());
    }
}
