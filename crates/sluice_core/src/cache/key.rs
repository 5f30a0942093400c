use std::collections::BTreeSet;
use std::fmt;

use crate::io::{KeyCondition, QueryContext, RowsInput};
use crate::scalar::ScalarValue;
use crate::scalar::ops::BinaryOperator;

/// A pushed down condition as it appears in a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKeyCondition {
    pub column_index: usize,
    pub operator: BinaryOperator,
    pub value: ScalarValue,
}

impl From<&KeyCondition> for CacheKeyCondition {
    fn from(cond: &KeyCondition) -> Self {
        CacheKeyCondition {
            column_index: cond.column_index,
            operator: cond.operator,
            value: cond.value.clone(),
        }
    }
}

impl fmt::Display for CacheKeyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.column_index, self.operator, self.value)
    }
}

/// Identifies one logical read of an input.
///
/// Conditions are kept sorted and deduplicated so that keys built from the
/// same conditions in a different order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: String,
    pub arguments: Vec<String>,
    /// Lowercased names of the requested columns. Empty requests all of
    /// them.
    pub columns: BTreeSet<String>,
    pub conditions: Vec<CacheKeyCondition>,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl CacheKey {
    pub fn new(
        input: &dyn RowsInput,
        context: &QueryContext,
        conditions: &[KeyCondition],
    ) -> Self {
        let mut conditions: Vec<CacheKeyCondition> = conditions.iter().map(Into::into).collect();
        conditions.sort_by(|a, b| {
            a.column_index
                .cmp(&b.column_index)
                .then(a.operator.cmp(&b.operator))
                .then_with(|| a.value.total_cmp(&b.value))
        });
        conditions.dedup();

        CacheKey {
            source: input.source_name().to_string(),
            arguments: input.arguments(),
            columns: context
                .columns
                .iter()
                .map(|c| c.to_ascii_lowercase())
                .collect(),
            conditions,
            offset: context.offset,
            limit: context.limit,
        }
    }

    /// Number of rows a read with this key consumes from the input, if
    /// bounded.
    pub fn max_rows(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_add(self.offset))
    }

    /// Check if an entry stored under this key can serve a read with
    /// `other`.
    ///
    /// The entry must hold at least the requested columns and at least as
    /// many leading rows. Its conditions must be a subset of the requested
    /// ones. Extra requested conditions are applied while reading from the
    /// entry, which is only correct if the entry holds every row.
    pub fn subsumes(&self, other: &CacheKey) -> bool {
        if self.source != other.source || self.arguments != other.arguments {
            return false;
        }

        let columns_ok = self.columns.is_empty()
            || (!other.columns.is_empty() && other.columns.is_subset(&self.columns));
        if !columns_ok {
            return false;
        }

        if !self.conditions.iter().all(|c| other.conditions.contains(c)) {
            return false;
        }
        let extra_conditions = other.conditions.len() > self.conditions.len();

        match (self.max_rows(), other.max_rows()) {
            (None, _) => true,
            (Some(_), _) if extra_conditions => false,
            (Some(have), Some(want)) => have >= want,
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        if !self.arguments.is_empty() {
            write!(f, "({})", self.arguments.join(", "))?;
        }
        if !self.columns.is_empty() {
            let cols: Vec<_> = self.columns.iter().map(String::as_str).collect();
            write!(f, " columns [{}]", cols.join(", "))?;
        }
        if !self.conditions.is_empty() {
            write!(f, " where [{}]", crate::explain::DisplayList(&self.conditions))?;
        }
        if self.offset > 0 {
            write!(f, " offset {}", self.offset)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {limit}")?;
        }
        Ok(())
    }
}
