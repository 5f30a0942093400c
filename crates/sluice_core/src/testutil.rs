//! Helpers shared by unit tests.

use std::sync::Arc;

use crate::compiler::units::UnitRef;
use crate::compiler::{CompiledAggregate, Compiler};
use crate::expr::binder::Binder;
use crate::expr::{ExprArena, NodeId};
use crate::functions::FunctionRegistry;
use crate::iterator::{BoxRowsIterator, FrameRowsIterator};
use crate::relational::{Column, schema};
use crate::scalar::{DataType, ScalarValue};
use crate::statistics::ExecutionStatistics;

pub fn rows_iter(
    columns: &[(&str, DataType)],
    rows: Vec<Vec<ScalarValue>>,
) -> BoxRowsIterator {
    Box::new(FrameRowsIterator::from_rows(
        schema(columns.iter().copied()),
        rows,
    ))
}

/// Single integer column iterator.
pub fn ints(name: &str, values: impl IntoIterator<Item = Option<i64>>) -> BoxRowsIterator {
    rows_iter(
        &[(name, DataType::Integer)],
        values.into_iter().map(|v| vec![v.into()]).collect(),
    )
}

pub fn compile_with_stats(
    columns: &[Column],
    stats: Arc<ExecutionStatistics>,
    build: impl FnOnce(&mut ExprArena) -> NodeId,
) -> UnitRef {
    let registry = FunctionRegistry::with_builtins();
    let mut arena = ExprArena::new();
    let root = build(&mut arena);
    Compiler::new(&registry, stats)
        .compile_for_schema(&arena, columns, root)
        .unwrap()
}

pub fn compile(columns: &[Column], build: impl FnOnce(&mut ExprArena) -> NodeId) -> UnitRef {
    compile_with_stats(columns, Arc::default(), build)
}

pub fn compile_agg(
    columns: &[Column],
    build: impl FnOnce(&mut ExprArena) -> NodeId,
) -> CompiledAggregate {
    let registry = FunctionRegistry::with_builtins();
    let mut arena = ExprArena::new();
    let root = build(&mut arena);
    let bindings = Binder::new(columns).bind_all(&arena, [root]).unwrap();
    Compiler::new(&registry, Arc::default())
        .compile_aggregate(&arena, &bindings, root)
        .unwrap()
}
