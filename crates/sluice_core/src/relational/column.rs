use std::fmt;

use serde::{Deserialize, Serialize};
use sluice_error::{DbError, Result};

use crate::scalar::DataType;

/// Prefix marking a column as hidden.
///
/// Hidden columns are addressable by operators but excluded from external
/// projection.
pub const HIDDEN_COLUMN_PREFIX: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Name of the source (table alias, input name) this column belongs to.
    pub source_name: Option<String>,
    pub datatype: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Column {
            name: name.into(),
            source_name: None,
            datatype,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_name = Some(source.into());
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with(HIDDEN_COLUMN_PREFIX)
    }

    /// Case insensitive name comparison, optionally also checking the source.
    ///
    /// A `source` of None matches a column from any source.
    pub fn name_equals(&self, name: &str, source: Option<&str>) -> bool {
        if !self.name.eq_ignore_ascii_case(name) {
            return false;
        }
        match (source, &self.source_name) {
            (None, _) => true,
            (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
            (Some(_), None) => false,
        }
    }

    pub fn full_name(&self) -> String {
        match &self.source_name {
            Some(source) => format!("{source}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.full_name(), self.datatype)
    }
}

/// Find the index of a column by name.
///
/// Returns Ok(None) if no column matches, and an error if the name is
/// ambiguous.
pub fn find_column_index(
    columns: &[Column],
    name: &str,
    source: Option<&str>,
) -> Result<Option<usize>> {
    let mut found = None;
    for (idx, col) in columns.iter().enumerate() {
        if !col.name_equals(name, source) {
            continue;
        }
        if found.is_some() {
            return Err(DbError::compile(format!("Ambiguous column name '{name}'"))
                .with_field("source", source.unwrap_or("<none>")));
        }
        found = Some(idx);
    }
    Ok(found)
}

/// Indices of columns that are not hidden.
pub fn visible_columns(columns: &[Column]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| (!c.is_hidden()).then_some(idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_equality() {
        let col = Column::new("Amount", DataType::Integer).with_source("Sales");
        assert!(col.name_equals("amount", None));
        assert!(col.name_equals("AMOUNT", Some("sales")));
        assert!(!col.name_equals("amount", Some("orders")));
        assert!(!Column::new("amount", DataType::Integer).name_equals("amount", Some("s")));
    }

    #[test]
    fn hidden_columns() {
        let cols = [
            Column::new("a", DataType::Integer),
            Column::new("__row_id", DataType::Integer),
            Column::new("b", DataType::String),
        ];
        assert_eq!(vec![0, 2], visible_columns(&cols));
    }

    #[test]
    fn ambiguous_lookup() {
        let cols = [
            Column::new("id", DataType::Integer).with_source("l"),
            Column::new("id", DataType::Integer).with_source("r"),
        ];
        assert!(find_column_index(&cols, "id", None).is_err());
        assert_eq!(Some(1), find_column_index(&cols, "id", Some("r")).unwrap());
        assert_eq!(None, find_column_index(&cols, "missing", None).unwrap());
    }
}
