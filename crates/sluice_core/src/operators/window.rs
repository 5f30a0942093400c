use std::cmp::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use hashbrown::HashMap;
use sluice_error::Result;
use tracing::debug;

use super::sort_index::{OrderKey, SortIndex, SortSpec, compare_keys};
use crate::compiler::CompiledAggregate;
use crate::compiler::units::{UnitRef, eval_all};
use crate::explain::{DisplayList, ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row, RowsFrame};
use crate::scalar::ScalarValue;
use crate::statistics::ExecutionStatistics;

/// An aggregate computed over a window, `agg(...) OVER (PARTITION BY ...
/// ORDER BY ...)`.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    /// Output column name.
    pub name: String,
    pub aggregate: CompiledAggregate,
    pub partition_by: Vec<UnitRef>,
    pub order_by: Vec<OrderKey>,
}

impl WindowSpec {
    pub fn new(name: impl Into<String>, aggregate: CompiledAggregate) -> Self {
        WindowSpec {
            name: name.into(),
            aggregate,
            partition_by: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn with_partition_by(mut self, units: Vec<UnitRef>) -> Self {
        self.partition_by = units;
        self
    }

    pub fn with_order_by(mut self, keys: Vec<OrderKey>) -> Self {
        self.order_by = keys;
        self
    }
}

/// Rows of one partition. Only holds the values the window needs.
#[derive(Debug, Default)]
struct Partition {
    /// Frame index of each row.
    rows: Vec<usize>,
    args: Vec<Vec<ScalarValue>>,
    order_keys: Vec<Vec<ScalarValue>>,
}

#[derive(Debug)]
struct WindowState {
    spec: WindowSpec,
    order_units: Vec<UnitRef>,
    order_specs: Vec<SortSpec>,
    partitions: HashMap<Vec<ScalarValue>, Partition>,
}

impl WindowState {
    fn new(spec: WindowSpec) -> Self {
        WindowState {
            order_units: spec.order_by.iter().map(|k| k.unit.clone()).collect(),
            order_specs: spec.order_by.iter().map(|k| k.spec).collect(),
            spec,
            partitions: HashMap::new(),
        }
    }

    fn add_row(&mut self, row_idx: usize, row: &Row) {
        let key = eval_all(&self.spec.partition_by, row);
        let partition = self.partitions.entry(key).or_default();
        partition.rows.push(row_idx);
        partition.args.push(eval_all(&self.spec.aggregate.args, row));
        partition.order_keys.push(eval_all(&self.order_units, row));
    }

    /// Compute the value for every row, writing it to `column` of the frame.
    ///
    /// With ORDER BY the frame for a row runs from the start of the
    /// partition through the last row that sorts equal to it. Without it
    /// every row gets the aggregate over the whole partition.
    fn compute(&self, frame: &mut RowsFrame, column: usize, stats: &ExecutionStatistics) {
        let agg = &self.spec.aggregate;
        for partition in self.partitions.values() {
            let mut state = agg.function.initial_state(agg.return_type);
            let invoke = |state: &mut Vec<ScalarValue>, pos: usize| {
                if let Err(code) = agg.function.invoke(state, &partition.args[pos]) {
                    stats.add_error(code);
                }
            };

            if self.order_specs.is_empty() {
                for pos in 0..partition.rows.len() {
                    invoke(&mut state, pos);
                }
                let result = agg.function.result(&state);
                for &row_idx in &partition.rows {
                    frame.update_value(row_idx, column, result.clone());
                }
                continue;
            }

            let index = SortIndex::build(&partition.order_keys, &self.order_specs);
            let sorted: Vec<usize> = index.iter().collect();
            let mut start = 0;
            while start < sorted.len() {
                let peer_key = &partition.order_keys[sorted[start]];
                let end = sorted[start..]
                    .iter()
                    .position(|&pos| {
                        compare_keys(&partition.order_keys[pos], peer_key, &self.order_specs)
                            != Ordering::Equal
                    })
                    .map_or(sorted.len(), |off| start + off);

                for &pos in &sorted[start..end] {
                    invoke(&mut state, pos);
                }
                let result = agg.function.result(&state);
                for &pos in &sorted[start..end] {
                    frame.update_value(partition.rows[pos], column, result.clone());
                }
                start = end;
            }
        }
    }
}

/// Adds one column per window to the child's rows.
///
/// Barrier operator: every row is buffered before the first is returned.
/// Rows come out in input order.
#[derive(Debug)]
pub struct WindowRowsIterator {
    child: BoxRowsIterator,
    windows: Vec<WindowState>,
    stats: Arc<ExecutionStatistics>,
    columns: Arc<[Column]>,
    frame: RowsFrame,
    row: Row,
    buf: Vec<ScalarValue>,
    drained: bool,
    next: usize,
}

impl WindowRowsIterator {
    pub fn new(
        child: BoxRowsIterator,
        windows: Vec<WindowSpec>,
        stats: Arc<ExecutionStatistics>,
    ) -> Self {
        let columns: Arc<[Column]> = child
            .columns()
            .iter()
            .cloned()
            .chain(
                windows
                    .iter()
                    .map(|w| Column::new(&w.name, w.aggregate.return_type)),
            )
            .collect();
        WindowRowsIterator {
            child,
            windows: windows.into_iter().map(WindowState::new).collect(),
            stats,
            frame: RowsFrame::new(columns.clone()),
            row: Row::new(columns.clone()),
            columns,
            buf: Vec::new(),
            drained: false,
            next: 0,
        }
    }

    fn add_row(&mut self) {
        let input = self.child.current();
        self.buf.clear();
        self.buf.extend_from_slice(input.values());
        self.buf.resize(self.columns.len(), ScalarValue::Null);
        let row_idx = self.frame.add_values(&self.buf);
        for window in &mut self.windows {
            window.add_row(row_idx, input);
        }
    }

    fn finish(&mut self) {
        let width = self.child.columns().len();
        for (idx, window) in self.windows.iter().enumerate() {
            window.compute(&mut self.frame, width + idx, &self.stats);
        }
        debug!(
            rows = self.frame.len(),
            partitions = ?self.windows.iter().map(|w| w.partitions.len()).collect::<Vec<_>>(),
            "window materialized"
        );
    }
}

impl RowsIterator for WindowRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        while !self.drained {
            if ready!(self.child.poll_move_next(cx))? {
                self.add_row();
            } else {
                self.finish();
                self.drained = true;
            }
        }

        if !self.frame.read_row(self.next, &mut self.row) {
            return Poll::Ready(Ok(false));
        }
        self.next += 1;
        Poll::Ready(Ok(true))
    }

    fn reset(&mut self) -> Result<()> {
        for window in &mut self.windows {
            window.partitions.clear();
        }
        self.frame.clear();
        self.drained = false;
        self.next = 0;
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for WindowRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Window").with_values(
            "windows",
            self.windows.iter().map(|w| {
                format!(
                    "{} AS {} (partition [{}], order [{}])",
                    w.spec.aggregate,
                    w.spec.name,
                    DisplayList(&w.spec.partition_by),
                    DisplayList(&w.spec.order_by),
                )
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;
    use crate::operators::sort_index::{NullOrder, SortDirection};
    use crate::scalar::DataType;
    use crate::testutil::{compile, compile_agg, rows_iter};

    fn input() -> BoxRowsIterator {
        rows_iter(
            &[("dept", DataType::String), ("amt", DataType::Integer)],
            vec![
                vec!["A".into(), 10.into()],
                vec!["B".into(), 5.into()],
                vec!["A".into(), 20.into()],
                vec!["A".into(), 10.into()],
            ],
        )
    }

    fn sum_amt(columns: &[Column]) -> CompiledAggregate {
        compile_agg(columns, |arena| {
            let amt = arena.col("amt");
            arena.call("sum", [amt])
        })
    }

    fn window_values(iter: &mut WindowRowsIterator) -> Vec<ScalarValue> {
        collect_rows_blocking(iter)
            .unwrap()
            .into_iter()
            .map(|r| r[2].clone())
            .collect()
    }

    #[test]
    fn partition_without_order() {
        let child = input();
        let dept = compile(child.columns(), |arena| arena.col("dept"));
        let spec = WindowSpec::new("dept_total", sum_amt(child.columns()))
            .with_partition_by(vec![dept]);
        let mut iter = WindowRowsIterator::new(child, vec![spec], Arc::default());

        let expected: Vec<ScalarValue> = vec![40.into(), 5.into(), 40.into(), 40.into()];
        assert_eq!(expected, window_values(&mut iter));

        iter.reset().unwrap();
        assert_eq!(expected, window_values(&mut iter));
    }

    #[test]
    fn running_total_includes_peers() {
        let child = input();
        let dept = compile(child.columns(), |arena| arena.col("dept"));
        let amt = compile(child.columns(), |arena| arena.col("amt"));
        let spec = WindowSpec::new("running", sum_amt(child.columns()))
            .with_partition_by(vec![dept])
            .with_order_by(vec![OrderKey::new(
                amt,
                SortDirection::Ascending,
                NullOrder::NullsLast,
            )]);
        let mut iter = WindowRowsIterator::new(child, vec![spec], Arc::default());

        // Both A rows with amt 10 are peers and see each other.
        let expected: Vec<ScalarValue> = vec![20.into(), 5.into(), 40.into(), 20.into()];
        assert_eq!(expected, window_values(&mut iter));
    }

    #[test]
    fn whole_input_as_one_partition() {
        let child = input();
        let count = compile_agg(child.columns(), |arena| arena.call("count", Vec::new()));
        let mut iter = WindowRowsIterator::new(
            child,
            vec![WindowSpec::new("n", count)],
            Arc::default(),
        );
        let expected: Vec<ScalarValue> = vec![4.into(); 4];
        assert_eq!(expected, window_values(&mut iter));
    }
}
