use std::sync::Arc;
use std::task::{Context, Poll, ready};

use sluice_error::Result;

use crate::compiler::units::UnitRef;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row};

/// A named output expression.
#[derive(Debug, Clone)]
pub struct ProjectItem {
    pub column: Column,
    pub unit: UnitRef,
}

impl ProjectItem {
    pub fn new(name: impl Into<String>, unit: UnitRef) -> Self {
        ProjectItem {
            column: Column::new(name, unit.datatype()),
            unit,
        }
    }
}

/// Evaluates select list expressions into a new row.
#[derive(Debug)]
pub struct ProjectRowsIterator {
    child: BoxRowsIterator,
    items: Vec<ProjectItem>,
    columns: Arc<[Column]>,
    row: Row,
}

impl ProjectRowsIterator {
    pub fn new(child: BoxRowsIterator, items: Vec<ProjectItem>) -> Self {
        let columns: Arc<[Column]> = items.iter().map(|i| i.column.clone()).collect();
        let row = Row::new(columns.clone());
        ProjectRowsIterator {
            child,
            items,
            columns,
            row,
        }
    }
}

impl RowsIterator for ProjectRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        if !ready!(self.child.poll_move_next(cx))? {
            return Poll::Ready(Ok(false));
        }
        let input = self.child.current();
        for (idx, item) in self.items.iter().enumerate() {
            self.row.set(idx, item.unit.eval(input));
        }
        Poll::Ready(Ok(true))
    }

    fn reset(&mut self) -> Result<()> {
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for ProjectRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Project").with_values(
            "projections",
            self.items
                .iter()
                .map(|i| format!("{} AS {}", i.unit, i.column.name)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;
    use crate::scalar::{DataType, ScalarValue};
    use crate::scalar::ops::BinaryOperator;
    use crate::testutil::{compile, rows_iter};

    #[test]
    fn computes_new_columns() {
        let child = rows_iter(
            &[("a", DataType::Integer), ("b", DataType::Integer)],
            vec![vec![1.into(), 2.into()], vec![3.into(), 4.into()]],
        );
        let sum = compile(child.columns(), |arena| {
            let a = arena.col("a");
            let b = arena.col("b");
            arena.binary(BinaryOperator::Add, a, b)
        });
        let b = compile(child.columns(), |arena| arena.col("b"));

        let mut iter = ProjectRowsIterator::new(
            child,
            vec![ProjectItem::new("b", b), ProjectItem::new("total", sum)],
        );
        assert_eq!("total", iter.columns()[1].name);
        assert_eq!(DataType::Integer, iter.columns()[1].datatype);

        let rows = collect_rows_blocking(&mut iter).unwrap();
        assert_eq!(
            vec![ScalarValue::Integer(4), ScalarValue::Integer(7)],
            rows[1]
        );
    }
}
