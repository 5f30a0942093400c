use std::sync::Arc;
use std::task::{Context, Poll, ready};

use hashbrown::HashSet;
use sluice_error::Result;

use crate::compiler::units::{UnitRef, eval_all};
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row};
use crate::scalar::ScalarValue;

/// Skips rows whose key was already returned.
///
/// Without key expressions the whole row is the key.
#[derive(Debug)]
pub struct DistinctRowsIterator {
    child: BoxRowsIterator,
    keys: Vec<UnitRef>,
    seen: HashSet<Vec<ScalarValue>>,
}

impl DistinctRowsIterator {
    pub fn new(child: BoxRowsIterator) -> Self {
        Self::with_keys(child, Vec::new())
    }

    pub fn with_keys(child: BoxRowsIterator, keys: Vec<UnitRef>) -> Self {
        DistinctRowsIterator {
            child,
            keys,
            seen: HashSet::new(),
        }
    }

    fn key(&self, row: &Row) -> Vec<ScalarValue> {
        if self.keys.is_empty() {
            row.values().to_vec()
        } else {
            eval_all(&self.keys, row)
        }
    }
}

impl RowsIterator for DistinctRowsIterator {
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
            let key = self.key(self.child.current());
            if self.seen.insert(key) {
                return Poll::Ready(Ok(true));
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.seen.clear();
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for DistinctRowsIterator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Distinct");
        let ent = if self.keys.is_empty() {
            ent
        } else {
            ent.with_values("keys", &self.keys)
        };
        ent.with_verbose_value(conf, "seen", self.seen.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;
    use crate::scalar::DataType;
    use crate::testutil::{compile, ints, rows_iter};

    #[test]
    fn whole_row() {
        let mut iter = DistinctRowsIterator::new(ints("a", [Some(1), Some(2), Some(1), None, None]));
        let rows = collect_rows_blocking(&mut iter).unwrap();
        assert_eq!(
            vec![
                vec![ScalarValue::Integer(1)],
                vec![ScalarValue::Integer(2)],
                vec![ScalarValue::Null]
            ],
            rows
        );

        iter.reset().unwrap();
        assert_eq!(3, collect_rows_blocking(&mut iter).unwrap().len());
    }

    #[test]
    fn by_key_keeps_first() {
        let child = rows_iter(
            &[("k", DataType::String), ("v", DataType::Integer)],
            vec![
                vec!["a".into(), 1.into()],
                vec!["b".into(), 2.into()],
                vec!["a".into(), 3.into()],
            ],
        );
        let key = compile(child.columns(), |arena| arena.col("k"));

        let mut iter = DistinctRowsIterator::with_keys(child, vec![key]);
        let rows = collect_rows_blocking(&mut iter).unwrap();
        assert_eq!(2, rows.len());
        assert_eq!(ScalarValue::Integer(1), rows[0][1]);
    }
}
