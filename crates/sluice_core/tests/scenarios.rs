mod setup;

use std::sync::atomic::Ordering;

use sluice_core::expr::ExprArena;
use sluice_core::io::memory::{MemoryRowsInput, MemoryRowsOutput};
use sluice_core::iterator::{collect_rows, collect_rows_blocking, first_scalar, write_to_output};
use sluice_core::operators::{JoinType, NullOrder};
use sluice_core::planner::{AggregateExpr, OrderByExpr, QueryShape, SelectItem, WindowExpr};
use sluice_core::relational::schema;
use sluice_core::scalar::ops::BinaryOperator;
use sluice_core::scalar::{DataType, ScalarValue};
use sluice_core::session::ExecutionSession;
use sluice_core::statistics::ErrorCode;
use sluice_error::ErrorKind;

use crate::setup::{ids_input, sales_input, sorted};

fn sales() -> MemoryRowsInput {
    sales_input(vec![
        vec!["A".into(), 10.into()],
        vec!["A".into(), 20.into()],
        vec!["B".into(), 5.into()],
    ])
}

#[test]
fn sum_by_dept() {
    logutil::init_test();
    let session = ExecutionSession::default();

    let mut shape = QueryShape::default();
    let dept = shape.arena.col("dept");
    let amt = shape.arena.col("amt");
    let sum = shape.arena.call("sum", [amt]);
    let out_dept = shape.arena.col("dept");
    let out_total = shape.arena.col("total");
    shape.group_by = vec![dept];
    shape.aggregates = vec![AggregateExpr::new("total", sum)];
    shape.select = vec![
        SelectItem::new("dept", out_dept),
        SelectItem::new("total", out_total),
    ];

    let mut iter = shape.plan(&session, Box::new(sales())).unwrap();
    let rows = sorted(collect_rows_blocking(iter.as_mut()).unwrap());
    let expected: Vec<Vec<ScalarValue>> = vec![
        vec!["A".into(), 30.into()],
        vec!["B".into(), 5.into()],
    ];
    assert_eq!(expected, rows);
}

#[test]
fn order_desc_nulls_last() {
    let session = ExecutionSession::default();
    let input = MemoryRowsInput::new(
        "amounts",
        schema([("amt", DataType::Integer)]),
        vec![
            vec![5.into()],
            vec![ScalarValue::Null],
            vec![20.into()],
            vec![10.into()],
        ],
    );

    let mut shape = QueryShape::default();
    let amt = shape.arena.col("amt");
    shape.order_by = vec![OrderByExpr::desc(amt).with_nulls(NullOrder::NullsLast)];

    let mut iter = shape.plan(&session, Box::new(input)).unwrap();
    let rows = collect_rows_blocking(iter.as_mut()).unwrap();
    let expected: Vec<Vec<ScalarValue>> = vec![
        vec![20.into()],
        vec![10.into()],
        vec![5.into()],
        vec![ScalarValue::Null],
    ];
    assert_eq!(expected, rows);
}

#[test]
fn left_join_pads_with_null() {
    let session = ExecutionSession::default();
    let right = MemoryRowsInput::new(
        "r",
        [
            sluice_core::relational::Column::new("id", DataType::Integer).with_source("r"),
            sluice_core::relational::Column::new("v", DataType::String).with_source("r"),
        ]
        .into(),
        vec![vec![1.into(), "x".into()]],
    );

    let mut arena = ExprArena::new();
    let l_id = arena.qualified_col("l", "id");
    let r_id = arena.qualified_col("r", "id");
    let pred = arena.binary(BinaryOperator::Equal, l_id, r_id);
    let out_id = arena.qualified_col("l", "id");
    let out_v = arena.qualified_col("r", "v");

    let right = Box::new(session.input_iterator(Box::new(right)));
    let mut iter = session
        .pipeline(Box::new(ids_input("l", &[Some(1), Some(2)])))
        .join(right, JoinType::Left, &arena, pred)
        .unwrap()
        .project(
            &arena,
            &[SelectItem::new("id", out_id), SelectItem::new("v", out_v)],
        )
        .unwrap()
        .build();

    let rows = collect_rows_blocking(iter.as_mut()).unwrap();
    let expected: Vec<Vec<ScalarValue>> = vec![
        vec![1.into(), "x".into()],
        vec![2.into(), ScalarValue::Null],
    ];
    assert_eq!(expected, rows);
}

#[test]
fn cached_input_is_read_once() {
    let session = ExecutionSession::default();
    let input = sales();
    let reads = input.read_counter();

    let mut shape = QueryShape::default();
    let amt = shape.arena.col("amt");
    let zero = shape.arena.lit(0);
    shape.filter = Some(shape.arena.binary(BinaryOperator::Greater, amt, zero));

    let mut iter = shape.plan(&session, Box::new(input)).unwrap();
    let first = collect_rows_blocking(iter.as_mut()).unwrap();
    assert_eq!(3, reads.load(Ordering::Relaxed));

    iter.reset().unwrap();
    let second = collect_rows_blocking(iter.as_mut()).unwrap();
    iter.reset().unwrap();
    let third = collect_rows_blocking(iter.as_mut()).unwrap();

    assert_eq!(3, reads.load(Ordering::Relaxed));
    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn cached_replay_counts_read_errors() {
    let session = ExecutionSession::default();
    let input = sales().with_read_error(1, 1, ErrorCode::CannotCast);
    let reads = input.read_counter();

    let mut iter = session.pipeline(Box::new(input)).build();
    let live = collect_rows_blocking(iter.as_mut()).unwrap();
    assert_eq!(1, session.statistics().errors_count());

    iter.reset().unwrap();
    let replayed = collect_rows_blocking(iter.as_mut()).unwrap();
    assert_eq!(3, reads.load(Ordering::Relaxed));
    assert_eq!(live, replayed);
    assert_eq!(ScalarValue::Null, replayed[1][1]);
    assert_eq!(2, session.statistics().error_count(ErrorCode::CannotCast));
}

#[test]
fn join_inner_side_is_served_from_cache() {
    let session = ExecutionSession::default();
    let right = ids_input("r", &[Some(1), Some(2), Some(3)]);
    let right_reads = right.read_counter();

    let mut arena = ExprArena::new();
    let l_id = arena.qualified_col("l", "id");
    let r_id = arena.qualified_col("r", "id");
    let pred = arena.binary(BinaryOperator::Equal, l_id, r_id);

    let right = Box::new(session.input_iterator(Box::new(right)));
    let mut iter = session
        .pipeline(Box::new(ids_input("l", &[Some(3), Some(1), Some(4), Some(1)])))
        .join(right, JoinType::Inner, &arena, pred)
        .unwrap()
        .build();

    let rows = collect_rows_blocking(iter.as_mut()).unwrap();
    assert_eq!(3, rows.len());
    // The right side is rescanned for every left row, but only read once.
    assert_eq!(3, right_reads.load(Ordering::Relaxed));
    // One entry per side. Every rescan after the first is a hit.
    assert_eq!(2, session.cache().misses());
    assert_eq!(3, session.cache().hits());
}

#[test]
fn running_total_window() {
    let session = ExecutionSession::default();

    let mut shape = QueryShape::default();
    let amt = shape.arena.col("amt");
    let sum = shape.arena.call("sum", [amt]);
    let dept = shape.arena.col("dept");
    let order_amt = shape.arena.col("amt");
    shape.windows = vec![WindowExpr {
        name: "running".to_string(),
        call: sum,
        partition_by: vec![dept],
        order_by: vec![OrderByExpr::asc(order_amt)],
    }];

    let mut iter = shape.plan(&session, Box::new(sales())).unwrap();
    let running: Vec<_> = collect_rows_blocking(iter.as_mut())
        .unwrap()
        .into_iter()
        .map(|r| r[2].clone())
        .collect();
    let expected: Vec<ScalarValue> = vec![10.into(), 30.into(), 5.into()];
    assert_eq!(expected, running);
}

#[test]
fn too_many_row_errors_abort() {
    let mut session = ExecutionSession::default();
    session.set_setting("max_errors", 1.into()).unwrap();

    let input = MemoryRowsInput::new(
        "divisors",
        schema([("d", DataType::Integer)]),
        vec![vec![1.into()], vec![0.into()], vec![2.into()], vec![0.into()]],
    );
    let mut shape = QueryShape::default();
    let ten = shape.arena.lit(10);
    let d = shape.arena.col("d");
    let div = shape.arena.binary(BinaryOperator::Divide, ten, d);
    shape.select = vec![SelectItem::new("q", div)];

    let mut iter = shape.plan(&session, Box::new(input)).unwrap();
    let err = collect_rows_blocking(iter.as_mut()).unwrap_err();
    assert!(err.is_kind(ErrorKind::MaxErrors));
    assert_eq!(Some("2"), err.get_field("errors"));
}

#[test]
fn row_errors_become_null() {
    let session = ExecutionSession::default();
    let input = MemoryRowsInput::new(
        "divisors",
        schema([("d", DataType::Integer)]),
        vec![vec![2.into()], vec![0.into()]],
    );
    let mut shape = QueryShape::default();
    let ten = shape.arena.lit(10);
    let d = shape.arena.col("d");
    let div = shape.arena.binary(BinaryOperator::Divide, ten, d);
    shape.select = vec![SelectItem::new("q", div)];

    let mut iter = shape.plan(&session, Box::new(input)).unwrap();
    let rows = collect_rows_blocking(iter.as_mut()).unwrap();
    let expected: Vec<Vec<ScalarValue>> = vec![vec![5.into()], vec![ScalarValue::Null]];
    assert_eq!(expected, rows);
    assert_eq!(1, session.statistics().errors_count());
}

#[test]
fn cancelled_session_stops_reads() {
    let session = ExecutionSession::default();
    let mut iter = session.pipeline(Box::new(sales())).build();
    session.cancel();

    let err = collect_rows_blocking(iter.as_mut()).unwrap_err();
    assert!(err.is_kind(ErrorKind::Cancelled));
}

#[test]
fn unknown_function_is_compile_error() {
    let session = ExecutionSession::default();
    let mut shape = QueryShape::default();
    let amt = shape.arena.col("amt");
    let call = shape.arena.call("no_such_function", [amt]);
    shape.select = vec![SelectItem::new("x", call)];

    let err = shape.plan(&session, Box::new(sales())).unwrap_err();
    assert!(err.is_kind(ErrorKind::Compile));
}

#[test]
fn explain_shows_stages() {
    let session = ExecutionSession::default();
    let mut arena = ExprArena::new();
    let amt = arena.col("amt");
    let five = arena.lit(5);
    let pred = arena.binary(BinaryOperator::GreaterOrEqual, amt, five);

    let builder = session
        .pipeline(Box::new(sales()))
        .filter(&arena, pred)
        .unwrap()
        .limit(2);
    assert_eq!(&["filter", "limit"], builder.stages());

    let explain = builder.explain();
    let lines: Vec<_> = explain.lines().collect();
    assert!(lines[0].starts_with("Limit"), "{explain}");
    assert!(lines[1].trim_start().starts_with("Filter"), "{explain}");
    assert!(lines[2].trim_start().starts_with("Cache"), "{explain}");
}

#[test]
fn scalar_and_output_drivers() {
    let session = ExecutionSession::default();

    let mut shape = QueryShape::default();
    let count = shape.arena.call("count", Vec::new());
    shape.aggregates = vec![AggregateExpr::new("n", count)];
    let n = shape.arena.col("n");
    shape.select = vec![SelectItem::new("n", n)];
    let mut iter = shape.plan(&session, Box::new(sales())).unwrap();
    let n = futures::executor::block_on(first_scalar(iter.as_mut())).unwrap();
    assert_eq!(ScalarValue::Integer(3), n);

    let mut iter = session.pipeline(Box::new(sales())).build();
    let mut out = MemoryRowsOutput::new();
    let written = futures::executor::block_on(write_to_output(iter.as_mut(), &mut out)).unwrap();
    assert_eq!(3, written);
    assert_eq!(3, out.rows.len());
}

#[tokio::test]
async fn pending_reads_resume() {
    let session = ExecutionSession::default();
    let input = sales_input(vec![
        vec!["B".into(), 1.into()],
        vec!["A".into(), 2.into()],
        vec!["B".into(), 3.into()],
    ])
    .with_yielding_reads();

    let mut shape = QueryShape::default();
    let dept = shape.arena.col("dept");
    let amt = shape.arena.col("amt");
    let sum = shape.arena.call("sum", [amt]);
    shape.group_by = vec![dept];
    shape.aggregates = vec![AggregateExpr::new("total", sum)];
    let order_dept = shape.arena.col("dept");
    shape.order_by = vec![OrderByExpr::asc(order_dept)];

    let mut iter = shape.plan(&session, Box::new(input)).unwrap();
    let rows = collect_rows(iter.as_mut()).await.unwrap();
    let totals: Vec<_> = rows.iter().map(|r| r[2].clone()).collect();
    let expected: Vec<ScalarValue> = vec![2.into(), 4.into()];
    assert_eq!(expected, totals);
}
