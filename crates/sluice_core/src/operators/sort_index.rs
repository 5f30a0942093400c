use std::cmp::Ordering;
use std::fmt;

use crate::compiler::units::UnitRef;
use crate::scalar::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Where nulls go, independent of the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullOrder {
    NullsFirst,
    #[default]
    NullsLast,
}

/// Comparison settings for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub direction: SortDirection,
    pub nulls: NullOrder,
}

impl SortSpec {
    pub const fn new(direction: SortDirection, nulls: NullOrder) -> Self {
        SortSpec { direction, nulls }
    }

    pub fn compare(&self, a: &ScalarValue, b: &ScalarValue) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match self.nulls {
                NullOrder::NullsFirst => Ordering::Less,
                NullOrder::NullsLast => Ordering::Greater,
            },
            (false, true) => match self.nulls {
                NullOrder::NullsFirst => Ordering::Greater,
                NullOrder::NullsLast => Ordering::Less,
            },
            (false, false) => {
                let ord = a.total_cmp(b);
                match self.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            }
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        let nulls = match self.nulls {
            NullOrder::NullsFirst => "NULLS FIRST",
            NullOrder::NullsLast => "NULLS LAST",
        };
        write!(f, "{dir} {nulls}")
    }
}

/// A compiled ORDER BY item.
#[derive(Debug, Clone)]
pub struct OrderKey {
    pub unit: UnitRef,
    pub spec: SortSpec,
}

impl OrderKey {
    pub fn new(unit: UnitRef, direction: SortDirection, nulls: NullOrder) -> Self {
        OrderKey {
            unit,
            spec: SortSpec::new(direction, nulls),
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.unit, self.spec)
    }
}

/// Compare two key tuples. The first key that differs decides.
pub fn compare_keys(a: &[ScalarValue], b: &[ScalarValue], specs: &[SortSpec]) -> Ordering {
    for ((a, b), spec) in a.iter().zip(b).zip(specs) {
        let ord = spec.compare(a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Permutation of row indices in sorted order.
///
/// Rows with equal keys keep their original relative order.
#[derive(Debug, Clone, Default)]
pub struct SortIndex {
    order: Vec<usize>,
}

impl SortIndex {
    /// Sort rows by precomputed key tuples, one tuple per row.
    pub fn build(keys: &[Vec<ScalarValue>], specs: &[SortSpec]) -> Self {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        // Stable.
        order.sort_by(|&a, &b| compare_keys(&keys[a], &keys[b], specs));
        SortIndex { order }
    }

    /// Index of the row at a sorted position.
    pub fn get(&self, pos: usize) -> Option<usize> {
        self.order.get(pos).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.order.iter().copied()
    }
}
