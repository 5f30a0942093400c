use std::sync::Arc;
use std::task::{Context, Poll};

use sluice_error::Result;

use super::RowsIterator;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::relational::{Column, Row, RowsFrame};
use crate::scalar::ScalarValue;

/// Iterator over rows stored in a frame.
#[derive(Debug)]
pub struct FrameRowsIterator {
    frame: RowsFrame,
    row: Row,
    next: usize,
}

impl FrameRowsIterator {
    pub fn new(frame: RowsFrame) -> Self {
        let row = Row::new(frame.columns().clone());
        FrameRowsIterator {
            frame,
            row,
            next: 0,
        }
    }

    pub fn from_rows(columns: Arc<[Column]>, rows: Vec<Vec<ScalarValue>>) -> Self {
        let mut frame = RowsFrame::new(columns);
        for row in &rows {
            frame.add_values(row);
        }
        Self::new(frame)
    }

    pub fn frame(&self) -> &RowsFrame {
        &self.frame
    }

    /// Position the iterator so that the next move lands on `row_idx`.
    pub fn seek(&mut self, row_idx: usize) {
        self.next = row_idx;
    }
}

impl RowsIterator for FrameRowsIterator {
    fn columns(&self) -> &Arc<[Column]> {
        self.frame.columns()
    }

    fn current(&self) -> &Row {
        &self.row
    }

    fn poll_move_next(&mut self, _cx: &mut Context) -> Poll<Result<bool>> {
        if !self.frame.read_row(self.next, &mut self.row) {
            return Poll::Ready(Ok(false));
        }
        self.next += 1;
        Poll::Ready(Ok(true))
    }

    fn reset(&mut self) -> Result<()> {
        self.next = 0;
        Ok(())
    }
}

impl Explainable for FrameRowsIterator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Frame").with_verbose_value(conf, "rows", self.frame.len())
    }
}
