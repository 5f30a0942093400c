//! Expression compiler.
//!
//! Compilation runs in two passes over an expression arena. `resolve` assigns
//! every node a type (and picks function overloads), recording the results in
//! a `ResolvedTypes` side table. `codegen` then builds an evaluator unit per
//! node from that table. The second pass needs the first to be complete
//! since overload selection depends on every argument's type.

pub mod codegen;
pub mod resolve;
pub mod units;

use std::fmt;
use std::sync::Arc;

use sluice_error::{DbError, Result};
use tracing::trace;

use self::codegen::{UnitMemo, bind_call_arguments, generate};
use self::resolve::{ResolveContext, ResolvedTypes, resolve};
use self::units::UnitRef;
use crate::expr::binder::{Binder, Bindings};
use crate::expr::{Expr, ExprArena, NodeId};
use crate::functions::aggregate::AggregateFunction;
use crate::functions::{FunctionImpl, FunctionRegistry};
use crate::relational::Column;
use crate::scalar::DataType;
use crate::statistics::ExecutionStatistics;

/// A compiled aggregate call.
#[derive(Debug, Clone)]
pub struct CompiledAggregate {
    pub name: &'static str,
    pub function: Arc<dyn AggregateFunction>,
    /// Argument units, ordered to match the signature.
    pub args: Vec<UnitRef>,
    pub return_type: DataType,
}

impl fmt::Display for CompiledAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.name,
            crate::explain::DisplayList(&self.args)
        )
    }
}

/// Compiles expressions into evaluator units.
///
/// Units generated by one compiler are memoized by node, so compiling
/// several roots that share sub-expressions only builds those once.
#[derive(Debug)]
pub struct Compiler<'a> {
    registry: &'a FunctionRegistry,
    stats: Arc<ExecutionStatistics>,
    resolved: ResolvedTypes,
    memo: UnitMemo,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a FunctionRegistry, stats: Arc<ExecutionStatistics>) -> Self {
        Compiler {
            registry,
            stats,
            resolved: ResolvedTypes::default(),
            memo: UnitMemo::default(),
        }
    }

    /// Types resolved so far.
    pub fn resolved(&self) -> &ResolvedTypes {
        &self.resolved
    }

    /// Compile a scalar expression.
    pub fn compile(
        &mut self,
        arena: &ExprArena,
        bindings: &Bindings,
        root: NodeId,
    ) -> Result<UnitRef> {
        resolve(
            self.registry,
            arena,
            bindings,
            root,
            ResolveContext::Scalar,
            &mut self.resolved,
        )?;
        let unit = generate(
            arena,
            bindings,
            &self.resolved,
            &self.stats,
            root,
            &mut self.memo,
        )?;
        trace!(expr = %arena.display(root), %unit, "compiled expression");
        Ok(unit)
    }

    pub fn compile_many(
        &mut self,
        arena: &ExprArena,
        bindings: &Bindings,
        roots: &[NodeId],
    ) -> Result<Vec<UnitRef>> {
        roots
            .iter()
            .map(|root| self.compile(arena, bindings, *root))
            .collect()
    }

    /// Compile an aggregate call such as `sum(a + 1)`.
    ///
    /// The root must be a call to an aggregate function. Its arguments are
    /// compiled as scalar expressions.
    pub fn compile_aggregate(
        &mut self,
        arena: &ExprArena,
        bindings: &Bindings,
        root: NodeId,
    ) -> Result<CompiledAggregate> {
        let Expr::Function { name, args } = arena.get(root)? else {
            return Err(DbError::compile("Expected an aggregate function call")
                .with_field("expression", arena.display(root)));
        };

        resolve(
            self.registry,
            arena,
            bindings,
            root,
            ResolveContext::AggregateRoot,
            &mut self.resolved,
        )?;
        let node = self
            .resolved
            .get(root)
            .and_then(|n| n.function.clone().map(|f| (f, n.datatype)));
        let Some((function, return_type)) = node else {
            return Err(DbError::new("Aggregate call was not resolved"));
        };
        let FunctionImpl::Aggregate(agg) = &function.implementation else {
            return Err(
                DbError::compile(format!("Function '{name}' is not an aggregate"))
                    .with_field("expression", arena.display(root)),
            );
        };

        for arg in args {
            generate(
                arena,
                bindings,
                &self.resolved,
                &self.stats,
                arg.value,
                &mut self.memo,
            )?;
        }
        let memo = &self.memo;
        let args = bind_call_arguments(&function, args, &|id: &NodeId| {
            memo.get(id)
                .cloned()
                .ok_or_else(|| DbError::new("Missing argument unit").with_field("node", id))
        })?;

        Ok(CompiledAggregate {
            name: function.signature.name,
            function: agg.clone(),
            args,
            return_type,
        })
    }

    /// Bind identifiers against a schema, then compile.
    pub fn compile_for_schema(
        &mut self,
        arena: &ExprArena,
        columns: &[Column],
        root: NodeId,
    ) -> Result<UnitRef> {
        let bindings = Binder::new(columns).bind_all(arena, [root])?;
        self.compile(arena, &bindings, root)
    }
}
