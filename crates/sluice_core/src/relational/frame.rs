use std::sync::Arc;

use super::column::Column;
use super::row::Row;
use crate::scalar::ScalarValue;

/// Number of rows stored per chunk.
pub const DEFAULT_CHUNK_ROWS: usize = 2048;

/// Append only row storage.
///
/// Rows are kept in fixed size chunks so growing the frame never moves
/// previously stored values. Values may be updated in place after the fact,
/// which is how barrier operators back-fill computed columns.
#[derive(Debug, Clone)]
pub struct RowsFrame {
    columns: Arc<[Column]>,
    chunk_rows: usize,
    chunks: Vec<Vec<ScalarValue>>,
    num_rows: usize,
}

impl RowsFrame {
    pub fn new(columns: Arc<[Column]>) -> Self {
        Self::with_chunk_rows(columns, DEFAULT_CHUNK_ROWS)
    }

    pub fn with_chunk_rows(columns: Arc<[Column]>, chunk_rows: usize) -> Self {
        RowsFrame {
            columns,
            chunk_rows: chunk_rows.max(1),
            chunks: Vec::new(),
            num_rows: 0,
        }
    }

    pub fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    fn width(&self) -> usize {
        self.columns.len()
    }

    /// Append a row, returning its index.
    pub fn add_values(&mut self, values: &[ScalarValue]) -> usize {
        debug_assert_eq!(self.width(), values.len());

        let row_idx = self.num_rows;
        if row_idx % self.chunk_rows == 0 {
            self.chunks
                .push(Vec::with_capacity(self.chunk_rows * self.width()));
        }
        // Chunk pushed above if needed.
        if let Some(chunk) = self.chunks.last_mut() {
            chunk.extend_from_slice(values);
        }
        self.num_rows += 1;
        row_idx
    }

    pub fn add_row(&mut self, row: &Row) -> usize {
        self.add_values(row.values())
    }

    /// Get the values for a row.
    pub fn row_values(&self, row_idx: usize) -> Option<&[ScalarValue]> {
        if row_idx >= self.num_rows {
            return None;
        }
        let width = self.width();
        let chunk = &self.chunks[row_idx / self.chunk_rows];
        let start = (row_idx % self.chunk_rows) * width;
        Some(&chunk[start..start + width])
    }

    pub fn get_value(&self, row_idx: usize, col_idx: usize) -> Option<&ScalarValue> {
        self.row_values(row_idx).and_then(|vals| vals.get(col_idx))
    }

    /// Copy a stored row into `row`. Returns false if the index is out of
    /// bounds.
    pub fn read_row(&self, row_idx: usize, row: &mut Row) -> bool {
        match self.row_values(row_idx) {
            Some(vals) => {
                row.set_range(0, vals);
                true
            }
            None => false,
        }
    }

    pub fn update_value(&mut self, row_idx: usize, col_idx: usize, value: ScalarValue) {
        let width = self.width();
        let chunk = &mut self.chunks[row_idx / self.chunk_rows];
        chunk[(row_idx % self.chunk_rows) * width + col_idx] = value;
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.num_rows = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &[ScalarValue]> + '_ {
        (0..self.num_rows).filter_map(move |idx| self.row_values(idx))
    }
}
