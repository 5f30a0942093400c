//! Pipeline assembly.
//!
//! `PipelineBuilder` stacks operators one stage at a time. `QueryShape`
//! describes a whole SELECT and drives the builder in SQL clause order.

pub mod builder;
pub mod shape;

pub use self::builder::PipelineBuilder;
pub use self::shape::{AggregateExpr, OrderByExpr, QueryShape, SelectItem, WindowExpr};
