use std::sync::Arc;
use std::task::{Context, Poll, ready};

use sluice_error::Result;
use tracing::debug;

use super::sort_index::{OrderKey, SortIndex, SortSpec};
use crate::compiler::units::{UnitRef, eval_all};
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row, RowsFrame};
use crate::scalar::ScalarValue;

/// Sorts the child's rows.
///
/// Drains the child into a frame on the first pull, then walks a sort index
/// over it.
#[derive(Debug)]
pub struct OrderRowsIterator {
    child: BoxRowsIterator,
    keys: Vec<OrderKey>,
    units: Vec<UnitRef>,
    specs: Vec<SortSpec>,
    frame: RowsFrame,
    key_values: Vec<Vec<ScalarValue>>,
    index: SortIndex,
    row: Row,
    drained: bool,
    next: usize,
}

impl OrderRowsIterator {
    pub fn new(child: BoxRowsIterator, keys: Vec<OrderKey>) -> Self {
        let columns = child.columns().clone();
        OrderRowsIterator {
            units: keys.iter().map(|k| k.unit.clone()).collect(),
            specs: keys.iter().map(|k| k.spec).collect(),
            keys,
            frame: RowsFrame::new(columns.clone()),
            row: Row::new(columns),
            child,
            key_values: Vec::new(),
            index: SortIndex::default(),
            drained: false,
            next: 0,
        }
    }
}

impl RowsIterator for OrderRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        self.frame.columns()
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        while !self.drained {
            if ready!(self.child.poll_move_next(cx))? {
                let row = self.child.current();
                self.key_values.push(eval_all(&self.units, row));
                self.frame.add_row(row);
            } else {
                self.index = SortIndex::build(&self.key_values, &self.specs);
                self.drained = true;
                debug!(rows = self.frame.len(), keys = self.keys.len(), "order materialized");
            }
        }

        let Some(row_idx) = self.index.get(self.next) else {
            return Poll::Ready(Ok(false));
        };
        self.frame.read_row(row_idx, &mut self.row);
        self.next += 1;
        Poll::Ready(Ok(true))
    }

    fn reset(&mut self) -> Result<()> {
        self.frame.clear();
        self.key_values.clear();
        self.index = SortIndex::default();
        self.drained = false;
        self.next = 0;
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for OrderRowsIterator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Order")
            .with_values("keys", &self.keys)
            .with_verbose_value(conf, "rows", self.frame.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;
    use crate::operators::sort_index::{NullOrder, SortDirection};
    use crate::scalar::DataType;
    use crate::testutil::{compile, ints, rows_iter};

    #[test]
    fn desc_nulls_last() {
        let child = ints("amt", [Some(5), None, Some(20), Some(10)]);
        let key = compile(child.columns(), |arena| arena.col("amt"));
        let mut iter = OrderRowsIterator::new(
            child,
            vec![OrderKey::new(key, SortDirection::Descending, NullOrder::NullsLast)],
        );

        let rows = collect_rows_blocking(&mut iter).unwrap();
        let expected: Vec<Vec<ScalarValue>> = vec![
            vec![20.into()],
            vec![10.into()],
            vec![5.into()],
            vec![ScalarValue::Null],
        ];
        assert_eq!(expected, rows);

        iter.reset().unwrap();
        assert_eq!(expected, collect_rows_blocking(&mut iter).unwrap());
    }

    #[test]
    fn stable_for_ties() {
        let child = rows_iter(
            &[("k", DataType::Integer), ("tag", DataType::Integer)],
            vec![
                vec![2.into(), 0.into()],
                vec![1.into(), 1.into()],
                vec![2.into(), 2.into()],
                vec![1.into(), 3.into()],
            ],
        );
        let key = compile(child.columns(), |arena| arena.col("k"));
        let mut iter = OrderRowsIterator::new(
            child,
            vec![OrderKey::new(key, SortDirection::Ascending, NullOrder::NullsLast)],
        );

        let tags: Vec<_> = collect_rows_blocking(&mut iter)
            .unwrap()
            .into_iter()
            .map(|r| r[1].try_as_i64().unwrap())
            .collect();
        assert_eq!(vec![1, 3, 0, 2], tags);
    }
}
