use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use hashbrown::HashSet;
use sluice_error::{DbError, ErrorKind, Result};
use tracing::debug;

use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row};
use crate::scalar::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineType {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl fmt::Display for CombineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => write!(f, "UNION"),
            Self::UnionAll => write!(f, "UNION ALL"),
            Self::Intersect => write!(f, "INTERSECT"),
            Self::Except => write!(f, "EXCEPT"),
        }
    }
}

/// Set operation over two inputs with the same shape.
///
/// Output columns are named after the left input. UNION ALL streams both
/// sides. UNION dedups across both sides. INTERSECT and EXCEPT first drain
/// the right side into a set, then return distinct left rows that are (or
/// are not) in it.
#[derive(Debug)]
pub struct CombineRowsIterator {
    combine_type: CombineType,
    left: BoxRowsIterator,
    right: BoxRowsIterator,
    row: Row,
    /// Rows already returned. Unused for UNION ALL.
    seen: HashSet<Vec<ScalarValue>>,
    /// Rows of the right side, for INTERSECT and EXCEPT.
    right_rows: HashSet<Vec<ScalarValue>>,
    right_drained: bool,
    left_done: bool,
}

impl CombineRowsIterator {
    pub fn try_new(
        left: BoxRowsIterator,
        right: BoxRowsIterator,
        combine_type: CombineType,
    ) -> Result<Self> {
        check_compatible(left.columns(), right.columns())
            .map_err(|e| e.with_field("combine", combine_type))?;
        Ok(CombineRowsIterator {
            combine_type,
            row: Row::new(left.columns().clone()),
            left,
            right,
            seen: HashSet::new(),
            right_rows: HashSet::new(),
            right_drained: false,
            left_done: false,
        })
    }

    fn return_row(&mut self, values: &[ScalarValue]) -> bool {
        if self.combine_type != CombineType::UnionAll && !self.seen.insert(values.to_vec()) {
            return false;
        }
        self.row.set_range(0, values);
        true
    }

    fn poll_union(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        while !self.left_done {
            if !ready!(self.left.poll_move_next(cx))? {
                self.left_done = true;
                break;
            }
            let values = self.left.current().values().to_vec();
            if self.return_row(&values) {
                return Poll::Ready(Ok(true));
            }
        }
        loop {
            if !ready!(self.right.poll_move_next(cx))? {
                return Poll::Ready(Ok(false));
            }
            let values = self.right.current().values().to_vec();
            if self.return_row(&values) {
                return Poll::Ready(Ok(true));
            }
        }
    }

    fn poll_filtered(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        while !self.right_drained {
            if ready!(self.right.poll_move_next(cx))? {
                self.right_rows
                    .insert(self.right.current().values().to_vec());
            } else {
                self.right_drained = true;
                debug!(rows = self.right_rows.len(), combine = %self.combine_type, "right side materialized");
            }
        }

        let want_present = self.combine_type == CombineType::Intersect;
        loop {
            if !ready!(self.left.poll_move_next(cx))? {
                return Poll::Ready(Ok(false));
            }
            let values = self.left.current().values().to_vec();
            if self.right_rows.contains(&values) != want_present {
                continue;
            }
            if self.return_row(&values) {
                return Poll::Ready(Ok(true));
            }
        }
    }
}

/// Both sides must have the same number of columns with matching types.
fn check_compatible(left: &[Column], right: &[Column]) -> Result<()> {
    if left.len() != right.len() {
        return Err(DbError::with_kind(
            ErrorKind::Compile,
            "Inputs have a different number of columns",
        )
        .with_field("left", left.len())
        .with_field("right", right.len()));
    }
    for (idx, (l, r)) in left.iter().zip(right).enumerate() {
        if l.datatype != r.datatype {
            return Err(DbError::with_kind(
                ErrorKind::Compile,
                "Inputs have different column types",
            )
            .with_field("column", idx)
            .with_field("left", l.datatype)
            .with_field("right", r.datatype));
        }
    }
    Ok(())
}

impl RowsIterator for CombineRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        self.left.columns()
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        match self.combine_type {
            CombineType::Union | CombineType::UnionAll => self.poll_union(cx),
            CombineType::Intersect | CombineType::Except => self.poll_filtered(cx),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.seen.clear();
        self.right_rows.clear();
        self.right_drained = false;
        self.left_done = false;
        self.left.reset()?;
        self.right.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }
}

impl Explainable for CombineRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Combine").with_value("combine_type", self.combine_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;
    use crate::scalar::DataType;
    use crate::testutil::{ints, rows_iter};

    fn run(left: &[i64], right: &[i64], combine_type: CombineType) -> Vec<i64> {
        let left = ints("a", left.iter().map(|v| Some(*v)));
        let right = ints("b", right.iter().map(|v| Some(*v)));
        let mut iter = CombineRowsIterator::try_new(left, right, combine_type).unwrap();
        let first: Vec<_> = collect_rows_blocking(&mut iter)
            .unwrap()
            .into_iter()
            .map(|r| r[0].try_as_i64().unwrap())
            .collect();

        iter.reset().unwrap();
        let second: Vec<_> = collect_rows_blocking(&mut iter)
            .unwrap()
            .into_iter()
            .map(|r| r[0].try_as_i64().unwrap())
            .collect();
        assert_eq!(first, second);
        first
    }

    #[test]
    fn union_all_keeps_duplicates() {
        assert_eq!(vec![1, 1, 2, 2, 3], run(&[1, 1, 2], &[2, 3], CombineType::UnionAll));
    }

    #[test]
    fn union_dedups_across_sides() {
        assert_eq!(vec![1, 2, 3], run(&[1, 1, 2], &[2, 3], CombineType::Union));
    }

    #[test]
    fn intersect() {
        assert_eq!(vec![2, 3], run(&[1, 2, 2, 3], &[3, 2, 5], CombineType::Intersect));
    }

    #[test]
    fn except() {
        assert_eq!(vec![1, 4], run(&[1, 2, 1, 4], &[2, 3], CombineType::Except));
    }

    #[test]
    fn schema_mismatch() {
        let left = ints("a", [Some(1)]);
        let right = rows_iter(&[("b", DataType::String)], vec![vec!["x".into()]]);
        let err = CombineRowsIterator::try_new(left, right, CombineType::Union).unwrap_err();
        assert!(err.is_kind(ErrorKind::Compile));

        let left = ints("a", [Some(1)]);
        let right = rows_iter(
            &[("b", DataType::Integer), ("c", DataType::Integer)],
            Vec::new(),
        );
        assert!(CombineRowsIterator::try_new(left, right, CombineType::Except).is_err());
    }
}
