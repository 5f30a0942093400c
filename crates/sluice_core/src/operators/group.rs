use std::sync::Arc;
use std::task::{Context, Poll, ready};

use ahash::RandomState;
use indexmap::IndexMap;
use indexmap::map::Entry;
use sluice_error::Result;
use tracing::debug;

use crate::compiler::CompiledAggregate;
use crate::compiler::units::{UnitRef, eval_all};
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row, RowsFrame};
use crate::scalar::ScalarValue;
use crate::statistics::ExecutionStatistics;

/// An aggregate computed per group, written to its own output column.
#[derive(Debug, Clone)]
pub struct AggregateTarget {
    pub name: String,
    pub aggregate: CompiledAggregate,
}

impl AggregateTarget {
    pub fn new(name: impl Into<String>, aggregate: CompiledAggregate) -> Self {
        AggregateTarget {
            name: name.into(),
            aggregate,
        }
    }

    fn column(&self) -> Column {
        Column::new(&self.name, self.aggregate.return_type)
    }

    fn initial_state(&self) -> Vec<ScalarValue> {
        self.aggregate
            .function
            .initial_state(self.aggregate.return_type)
    }

    fn update(&self, state: &mut [ScalarValue], row: &Row, stats: &ExecutionStatistics) {
        let args = eval_all(&self.aggregate.args, row);
        if let Err(code) = self.aggregate.function.invoke(state, &args) {
            stats.add_error(code);
        }
    }
}

#[derive(Debug)]
struct GroupState {
    /// Index of the group's row in the output frame.
    row_idx: usize,
    /// One state per target.
    states: Vec<Vec<ScalarValue>>,
}

/// Groups rows by key and computes aggregates per group.
///
/// The child is drained on the first pull. Output rows hold the values of
/// the first row seen for each group, followed by one column per target.
/// Groups are returned in the order they were first seen. Without group
/// keys there's always exactly one output row, even for an empty input.
#[derive(Debug)]
pub struct GroupRowsIterator {
    child: BoxRowsIterator,
    keys: Vec<UnitRef>,
    targets: Vec<AggregateTarget>,
    stats: Arc<ExecutionStatistics>,
    columns: Arc<[Column]>,
    groups: IndexMap<Vec<ScalarValue>, GroupState, RandomState>,
    frame: RowsFrame,
    row: Row,
    /// Reused buffer for building output rows.
    buf: Vec<ScalarValue>,
    drained: bool,
    next: usize,
}

impl GroupRowsIterator {
    pub fn new(
        child: BoxRowsIterator,
        keys: Vec<UnitRef>,
        targets: Vec<AggregateTarget>,
        stats: Arc<ExecutionStatistics>,
    ) -> Self {
        let columns: Arc<[Column]> = child
            .columns()
            .iter()
            .cloned()
            .chain(targets.iter().map(|t| t.column()))
            .collect();
        GroupRowsIterator {
            child,
            keys,
            targets,
            stats,
            frame: RowsFrame::new(columns.clone()),
            row: Row::new(columns.clone()),
            columns,
            groups: IndexMap::default(),
            buf: Vec::new(),
            drained: false,
            next: 0,
        }
    }

    fn input_width(&self) -> usize {
        self.child.columns().len()
    }

    fn add_row(&mut self) {
        let input = self.child.current();
        let key = eval_all(&self.keys, input);

        let state = match self.groups.entry(key) {
            Entry::Occupied(ent) => ent.into_mut(),
            Entry::Vacant(ent) => {
                self.buf.clear();
                self.buf.extend_from_slice(input.values());
                self.buf.resize(self.columns.len(), ScalarValue::Null);
                let row_idx = self.frame.add_values(&self.buf);
                let states = self.targets.iter().map(|t| t.initial_state()).collect();
                ent.insert(GroupState { row_idx, states })
            }
        };

        for (target, target_state) in self.targets.iter().zip(&mut state.states) {
            target.update(target_state, input, &self.stats);
        }
    }

    fn finish(&mut self) {
        if self.groups.is_empty() && self.keys.is_empty() {
            self.buf.clear();
            self.buf.resize(self.columns.len(), ScalarValue::Null);
            let row_idx = self.frame.add_values(&self.buf);
            let states = self.targets.iter().map(|t| t.initial_state()).collect();
            self.groups
                .insert(Vec::new(), GroupState { row_idx, states });
        }

        let width = self.input_width();
        for group in self.groups.values() {
            for (idx, (target, state)) in self.targets.iter().zip(&group.states).enumerate() {
                let result = target.aggregate.function.result(state);
                self.frame.update_value(group.row_idx, width + idx, result);
            }
        }

        debug!(
            groups = self.groups.len(),
            targets = self.targets.len(),
            "group materialized"
        );
    }
}

impl RowsIterator for GroupRowsIterator {
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
        self.groups.clear();
        self.frame.clear();
        self.drained = false;
        self.next = 0;
        self.child.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        vec![self.child.as_ref()]
    }
}

impl Explainable for GroupRowsIterator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Group");
        let ent = if self.keys.is_empty() {
            ent
        } else {
            ent.with_values("keys", &self.keys)
        };
        ent.with_named_map(
            "aggregates",
            "targets",
            self.targets.iter().map(|t| (&t.name, &t.aggregate)),
        )
        .with_verbose_value(conf, "groups", self.groups.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_rows_blocking;
    use crate::scalar::DataType;
    use crate::testutil::{compile, compile_agg, rows_iter};

    fn sales() -> BoxRowsIterator {
        rows_iter(
            &[("dept", DataType::String), ("amt", DataType::Integer)],
            vec![
                vec!["A".into(), 10.into()],
                vec!["B".into(), 5.into()],
                vec!["A".into(), 20.into()],
                vec!["B".into(), ScalarValue::Null],
            ],
        )
    }

    fn targets(columns: &[Column]) -> Vec<AggregateTarget> {
        vec![
            AggregateTarget::new(
                "total",
                compile_agg(columns, |arena| {
                    let amt = arena.col("amt");
                    arena.call("sum", [amt])
                }),
            ),
            AggregateTarget::new("n", compile_agg(columns, |arena| arena.call("count", Vec::new()))),
        ]
    }

    #[test]
    fn group_by_key() {
        let child = sales();
        let key = compile(child.columns(), |arena| arena.col("dept"));
        let targets = targets(child.columns());
        let mut iter = GroupRowsIterator::new(child, vec![key], targets, Arc::default());

        assert_eq!(4, iter.columns().len());
        let rows = collect_rows_blocking(&mut iter).unwrap();
        let expected: Vec<Vec<ScalarValue>> = vec![
            vec!["A".into(), 10.into(), 30.into(), 2.into()],
            vec!["B".into(), 5.into(), 5.into(), 2.into()],
        ];
        assert_eq!(expected, rows);

        iter.reset().unwrap();
        assert_eq!(rows, collect_rows_blocking(&mut iter).unwrap());
    }

    #[test]
    fn no_keys_single_group() {
        let child = sales();
        let targets = targets(child.columns());
        let mut iter = GroupRowsIterator::new(child, Vec::new(), targets, Arc::default());

        let rows = collect_rows_blocking(&mut iter).unwrap();
        assert_eq!(1, rows.len());
        assert_eq!(ScalarValue::Integer(35), rows[0][2]);
        assert_eq!(ScalarValue::Integer(4), rows[0][3]);
    }

    #[test]
    fn empty_input_without_keys() {
        let child = rows_iter(
            &[("dept", DataType::String), ("amt", DataType::Integer)],
            Vec::new(),
        );
        let targets = targets(child.columns());
        let mut iter = GroupRowsIterator::new(child, Vec::new(), targets, Arc::default());

        let rows = collect_rows_blocking(&mut iter).unwrap();
        assert_eq!(
            vec![vec![
                ScalarValue::Null,
                ScalarValue::Null,
                ScalarValue::Null,
                ScalarValue::Integer(0)
            ]],
            rows
        );
    }

    #[test]
    fn empty_input_with_keys() {
        let child = rows_iter(
            &[("dept", DataType::String), ("amt", DataType::Integer)],
            Vec::new(),
        );
        let key = compile(child.columns(), |arena| arena.col("dept"));
        let targets = targets(child.columns());
        let mut iter = GroupRowsIterator::new(child, vec![key], targets, Arc::default());

        assert!(collect_rows_blocking(&mut iter).unwrap().is_empty());
    }
}
