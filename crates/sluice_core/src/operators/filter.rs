use std::sync::Arc;
use std::task::{Context, Poll, ready};

use sluice_error::Result;

use crate::compiler::units::UnitRef;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row};

/// Passes through rows for which the predicate is true.
///
/// Null and false both reject the row.
#[derive(Debug)]
pub struct FilterRowsIterator {
    child: BoxRowsIterator,
    predicate: UnitRef,
}

impl FilterRowsIterator {
    pub fn new(child: BoxRowsIterator, predicate: UnitRef) -> Self {
        FilterRowsIterator { child, predicate }
    }
}

impl RowsIterator for FilterRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        self.child.columns()
    }

    fn current(&self) -> &Row {
        self.child.current()
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        loop {
            if !ready!(self.child.poll_move_next(cx))? {
                return Poll::Ready(Ok(false));
            }
            if self.predicate.eval(self.child.current()).is_true() {
                return Poll::Ready(Ok(true));
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for FilterRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Filter").with_value("predicate", &self.predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;
    use crate::scalar::ScalarValue;
    use crate::scalar::ops::BinaryOperator;
    use crate::testutil::{compile, ints};

    #[test]
    fn filters_nulls_and_false() {
        let child = ints("a", [Some(1), None, Some(5), Some(7)]);
        let pred = compile(child.columns(), |arena| {
            let a = arena.col("a");
            let three = arena.lit(3);
            arena.binary(BinaryOperator::Greater, a, three)
        });

        let mut iter = FilterRowsIterator::new(child, pred);
        let rows = collect_rows_blocking(&mut iter).unwrap();
        assert_eq!(
            vec![vec![ScalarValue::Integer(5)], vec![ScalarValue::Integer(7)]],
            rows
        );

        iter.reset().unwrap();
        assert_eq!(2, collect_rows_blocking(&mut iter).unwrap().len());
    }
}
