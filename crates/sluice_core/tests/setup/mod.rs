#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::Arc;

use rand::Rng;
use sluice_core::io::memory::MemoryRowsInput;
use sluice_core::relational::{Column, schema};
use sluice_core::scalar::{DataType, ScalarValue};

pub const DEPTS: [&str; 3] = ["A", "B", "C"];

/// `(dept, amt)` input.
pub fn sales_input(rows: Vec<Vec<ScalarValue>>) -> MemoryRowsInput {
    MemoryRowsInput::new(
        "sales",
        schema([("dept", DataType::String), ("amt", DataType::Integer)]),
        rows,
    )
}

/// Random `(dept, amt)` rows. Both columns are sometimes null.
pub fn random_sales(rng: &mut impl Rng, len: usize) -> Vec<Vec<ScalarValue>> {
    (0..len)
        .map(|_| {
            let dept = if rng.random_bool(0.1) {
                ScalarValue::Null
            } else {
                DEPTS[rng.random_range(0..DEPTS.len())].into()
            };
            let amt = if rng.random_bool(0.1) {
                ScalarValue::Null
            } else {
                rng.random_range(-50_i64..50).into()
            };
            vec![dept, amt]
        })
        .collect()
}

/// Single integer column input whose columns are qualified with `source`.
pub fn ids_input(source: &str, ids: &[Option<i64>]) -> MemoryRowsInput {
    let columns: Arc<[Column]> = [Column::new("id", DataType::Integer).with_source(source)].into();
    MemoryRowsInput::new(
        source,
        columns,
        ids.iter().map(|id| vec![(*id).into()]).collect::<Vec<_>>(),
    )
}

pub fn compare_rows(a: &[ScalarValue], b: &[ScalarValue]) -> Ordering {
    for (a, b) in a.iter().zip(b) {
        let ord = a.total_cmp(b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Rows in a canonical order, for comparing results as multisets.
pub fn sorted(mut rows: Vec<Vec<ScalarValue>>) -> Vec<Vec<ScalarValue>> {
    rows.sort_by(|a, b| compare_rows(a, b));
    rows
}

/// Check that every row of `sub` appears in `sup`, counting duplicates.
pub fn is_sub_multiset(sub: &[Vec<ScalarValue>], sup: &[Vec<ScalarValue>]) -> bool {
    let mut remaining = sup.to_vec();
    for row in sub {
        match remaining.iter().position(|r| r == row) {
            Some(idx) => {
                remaining.swap_remove(idx);
            }
            None => return false,
        }
    }
    true
}
