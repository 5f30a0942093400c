pub mod column;
pub mod frame;
pub mod row;

pub use self::column::{Column, find_column_index, visible_columns};
pub use self::frame::RowsFrame;
pub use self::row::Row;

use std::sync::Arc;

use crate::scalar::DataType;

/// Build a schema from (name, type) pairs.
pub fn schema<'a>(cols: impl IntoIterator<Item = (&'a str, DataType)>) -> Arc<[Column]> {
    cols.into_iter()
        .map(|(name, datatype)| Column::new(name, datatype))
        .collect()
}
