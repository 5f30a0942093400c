//! Pull based row iterators.
//!
//! Every operator in a pipeline implements `RowsIterator`. Moving to the next
//! row is poll based: an iterator only returns `Pending` when one of its leaf
//! inputs is waiting on I/O, and it must pick up where it left off when
//! polled again.

pub mod empty;
pub mod enumerable;
pub mod frame;
pub mod input;

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::executor::block_on;
use futures::future::poll_fn;
use sluice_error::Result;

pub use self::empty::{EmptyRowsIterator, SingleValueRowsIterator};
pub use self::enumerable::EnumerableRowsIterator;
pub use self::frame::FrameRowsIterator;
pub use self::input::RowsInputIterator;
use crate::explain::Explainable;
use crate::io::RowsOutput;
use crate::relational::{Column, Row, RowsFrame, visible_columns};
use crate::scalar::ScalarValue;

pub trait RowsIterator: Explainable + Send + std::fmt::Debug {
    fn columns(&self) -> &Arc<[Column]>;

    /// The current row.
    ///
    /// Only valid after `poll_move_next` returned Ready(Ok(true)).
    fn current(&self) -> &Row;

    /// Try to advance to the next row.
    fn poll_move_next(&mut self, cx: &mut Context) -> Poll<Result<bool>>;

    /// Rewind so the rows can be enumerated again.
    fn reset(&mut self) -> Result<()>;

    /// Child iterators, for explain output.
    fn children(&self) -> Vec<&dyn RowsIterator> {
        Vec::new()
    }
}

pub type BoxRowsIterator = Box<dyn RowsIterator>;

/// Advance the iterator.
pub async fn move_next<I>(iter: &mut I) -> Result<bool>
where
    I: RowsIterator + ?Sized,
{
    poll_fn(|cx| iter.poll_move_next(cx)).await
}

/// Drain the iterator, collecting every row's values.
pub async fn collect_rows<I>(iter: &mut I) -> Result<Vec<Vec<ScalarValue>>>
where
    I: RowsIterator + ?Sized,
{
    let mut rows = Vec::new();
    while move_next(iter).await? {
        rows.push(iter.current().values().to_vec());
    }
    Ok(rows)
}

/// Drain the iterator on the current thread.
pub fn collect_rows_blocking<I>(iter: &mut I) -> Result<Vec<Vec<ScalarValue>>>
where
    I: RowsIterator + ?Sized,
{
    block_on(collect_rows(iter))
}

/// Drain the iterator into a frame.
pub async fn materialize<I>(iter: &mut I) -> Result<RowsFrame>
where
    I: RowsIterator + ?Sized,
{
    let mut frame = RowsFrame::new(iter.columns().clone());
    while move_next(iter).await? {
        frame.add_row(iter.current());
    }
    Ok(frame)
}

/// Get the first value of the first row, or null if there are no rows.
pub async fn first_scalar<I>(iter: &mut I) -> Result<ScalarValue>
where
    I: RowsIterator + ?Sized,
{
    if move_next(iter).await? {
        Ok(iter.current().get(0).cloned().unwrap_or_default())
    } else {
        Ok(ScalarValue::Null)
    }
}

/// Write all rows to an output, skipping hidden columns.
///
/// Returns the number of rows written.
pub async fn write_to_output<I>(iter: &mut I, output: &mut dyn RowsOutput) -> Result<u64>
where
    I: RowsIterator + ?Sized,
{
    let visible = visible_columns(iter.columns());
    let columns: Vec<_> = visible.iter().map(|&idx| iter.columns()[idx].clone()).collect();

    output.open(&columns)?;
    let mut count = 0;
    let mut buf = Vec::with_capacity(visible.len());
    while move_next(iter).await? {
        let row = iter.current();
        buf.clear();
        buf.extend(visible.iter().map(|&idx| row[idx].clone()));
        output.write_values(&buf)?;
        count += 1;
    }
    output.close()?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryRowsOutput;
    use crate::relational::schema;
    use crate::scalar::DataType;

    #[test]
    fn write_skips_hidden_columns() {
        let cols = schema([("a", DataType::Integer), ("__tag", DataType::Integer)]);
        let mut iter = FrameRowsIterator::from_rows(
            cols,
            vec![vec![1.into(), 10.into()], vec![2.into(), 20.into()]],
        );

        let mut out = MemoryRowsOutput::new();
        let count = block_on(write_to_output(&mut iter, &mut out)).unwrap();

        assert_eq!(2, count);
        assert_eq!(1, out.columns.len());
        assert_eq!(vec![vec![ScalarValue::Integer(2)]], out.rows[1..].to_vec());
        assert!(out.closed);
    }

    #[test]
    fn first_scalar_of_empty() {
        let mut iter = EmptyRowsIterator::new(schema([("a", DataType::Integer)]));
        let v = block_on(first_scalar(&mut iter)).unwrap();
        assert_eq!(ScalarValue::Null, v);
    }
}
