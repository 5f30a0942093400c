use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use super::column::Column;
use crate::scalar::ScalarValue;

/// A fixed arity row of values bound to a column schema.
///
/// Iterators reuse a single row between calls. Clone the values if they need
/// to outlive the next move.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<ScalarValue>,
}

impl Row {
    /// Create a row with every value set to null.
    pub fn new(columns: Arc<[Column]>) -> Self {
        let values = vec![ScalarValue::Null; columns.len()];
        Row { columns, values }
    }

    pub fn from_values(columns: Arc<[Column]>, values: Vec<ScalarValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Row { columns, values }
    }

    pub fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get(idx)
    }

    pub fn set(&mut self, idx: usize, value: ScalarValue) {
        self.values[idx] = value;
    }

    /// Copy values into this row starting at `offset`.
    pub fn set_range(&mut self, offset: usize, values: &[ScalarValue]) {
        self.values[offset..offset + values.len()].clone_from_slice(values);
    }

    /// Set a range of values to null.
    pub fn clear_range(&mut self, offset: usize, len: usize) {
        for v in &mut self.values[offset..offset + len] {
            *v = ScalarValue::Null;
        }
    }

    pub fn clear(&mut self) {
        self.clear_range(0, self.values.len());
    }

    pub fn into_values(self) -> Vec<ScalarValue> {
        self.values
    }
}

impl Index<usize> for Row {
    type Output = ScalarValue;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, v) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}
