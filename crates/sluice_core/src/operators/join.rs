use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use sluice_error::Result;

use crate::compiler::units::UnitRef;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::iterator::{BoxRowsIterator, RowsIterator};
use crate::relational::{Column, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
            Self::Full => write!(f, "FULL"),
        }
    }
}

/// Schema of a join's output. The predicate is bound against this.
pub fn join_columns(left: &[Column], right: &[Column]) -> Arc<[Column]> {
    left.iter().chain(right).cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinPhase {
    Probe,
    /// Rescan of the inner side returning rows that never matched.
    UnmatchedInner,
    Done,
}

/// Nested loop join.
///
/// For every outer row the inner side is reset and scanned in full, so
/// the cost is the product of both sides. The left side is the outer side
/// except for RIGHT joins, which swap roles. Output rows are always the
/// left columns followed by the right columns.
#[derive(Debug)]
pub struct NestedLoopJoinRowsIterator {
    join_type: JoinType,
    outer: BoxRowsIterator,
    inner: BoxRowsIterator,
    predicate: UnitRef,
    columns: Arc<[Column]>,
    row: Row,
    outer_offset: usize,
    inner_offset: usize,
    phase: JoinPhase,
    outer_active: bool,
    outer_matched: bool,
    inner_pos: usize,
    /// Inner rows that matched at least one outer row. FULL joins only.
    inner_matched: Vec<bool>,
}

impl NestedLoopJoinRowsIterator {
    pub fn new(
        left: BoxRowsIterator,
        right: BoxRowsIterator,
        join_type: JoinType,
        predicate: UnitRef,
    ) -> Self {
        let columns = join_columns(left.columns(), right.columns());
        let left_width = left.columns().len();
        let (outer, inner, outer_offset, inner_offset) = match join_type {
            JoinType::Right => (right, left, left_width, 0),
            _ => (left, right, 0, left_width),
        };
        NestedLoopJoinRowsIterator {
            join_type,
            outer,
            inner,
            predicate,
            row: Row::new(columns.clone()),
            columns,
            outer_offset,
            inner_offset,
            phase: JoinPhase::Probe,
            outer_active: false,
            outer_matched: false,
            inner_pos: 0,
            inner_matched: Vec::new(),
        }
    }

    /// If unmatched outer rows are returned padded with nulls.
    fn preserves_outer(&self) -> bool {
        matches!(
            self.join_type,
            JoinType::Left | JoinType::Right | JoinType::Full
        )
    }

    fn mark_inner_matched(&mut self, pos: usize) {
        if self.inner_matched.len() <= pos {
            self.inner_matched.resize(pos + 1, false);
        }
        self.inner_matched[pos] = true;
    }

    fn poll_probe(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        loop {
            if !self.outer_active {
                if !ready!(self.outer.poll_move_next(cx))? {
                    if self.join_type == JoinType::Full {
                        self.inner.reset()?;
                        self.inner_pos = 0;
                        self.phase = JoinPhase::UnmatchedInner;
                    } else {
                        self.phase = JoinPhase::Done;
                    }
                    return Poll::Ready(Ok(false));
                }
                self.outer_active = true;
                self.outer_matched = false;
                self.inner.reset()?;
                self.inner_pos = 0;
                self.row
                    .set_range(self.outer_offset, self.outer.current().values());
            }

            if ready!(self.inner.poll_move_next(cx))? {
                let pos = self.inner_pos;
                self.inner_pos += 1;
                self.row
                    .set_range(self.inner_offset, self.inner.current().values());
                if self.predicate.eval(&self.row).is_true() {
                    self.outer_matched = true;
                    if self.join_type == JoinType::Full {
                        self.mark_inner_matched(pos);
                    }
                    return Poll::Ready(Ok(true));
                }
                continue;
            }

            self.outer_active = false;
            if !self.outer_matched && self.preserves_outer() {
                let width = self.inner.columns().len();
                self.row.clear_range(self.inner_offset, width);
                return Poll::Ready(Ok(true));
            }
        }
    }

    fn poll_unmatched_inner(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        loop {
            if !ready!(self.inner.poll_move_next(cx))? {
                self.phase = JoinPhase::Done;
                return Poll::Ready(Ok(false));
            }
            let pos = self.inner_pos;
            self.inner_pos += 1;
            if self.inner_matched.get(pos).copied().unwrap_or(false) {
                continue;
            }
            let width = self.outer.columns().len();
            self.row.clear_range(self.outer_offset, width);
            self.row
                .set_range(self.inner_offset, self.inner.current().values());
            return Poll::Ready(Ok(true));
        }
    }
}

impl RowsIterator for NestedLoopJoinRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>> {
        loop {
            match self.phase {
                JoinPhase::Probe => {
                    if ready!(self.poll_probe(cx))? {
                        return Poll::Ready(Ok(true));
                    }
                    // Probe finished, the phase moved on.
                }
                JoinPhase::UnmatchedInner => return self.poll_unmatched_inner(cx),
                JoinPhase::Done => return Poll::Ready(Ok(false)),
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.phase = JoinPhase::Probe;
        self.outer_active = false;
        self.outer_matched = false;
        self.inner_pos = 0;
        self.inner_matched.clear();
        self.outer.reset()?;
        self.inner.reset()
    }

    fn children(&self) -> Vec<&dyn RowsIterator> {
        match self.join_type {
            JoinType::Right => vec![self.inner.as_ref(), self.outer.as_ref()],
            _ => vec![self.outer.as_ref(), self.inner.as_ref()],
        }
    }
}

impl Explainable for NestedLoopJoinRowsIterator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("NestedLoopJoin")
            .with_value("join_type", self.join_type)
            .with_value("predicate", &self.predicate)
    }
}
