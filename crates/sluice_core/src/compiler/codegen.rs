use std::sync::Arc;

use hashbrown::HashMap;
use sluice_error::{DbError, OptionExt, Result};

use super::resolve::ResolvedTypes;
use super::units::{
    BetweenUnit,
    BinaryUnit,
    CaseUnit,
    CastUnit,
    CoalesceUnit,
    ColumnUnit,
    FunctionUnit,
    InListUnit,
    LikeUnit,
    LiteralUnit,
    LogicalUnit,
    UnaryUnit,
    UnitRef,
};
use crate::expr::binder::Bindings;
use crate::expr::{Expr, ExprArena, FunctionArg, NodeId};
use crate::functions::{Function, FunctionImpl};
use crate::scalar::ops::BinaryOperator;
use crate::statistics::ExecutionStatistics;

/// Units generated so far, keyed by node. Shared sub-expressions are only
/// generated once.
pub type UnitMemo = HashMap<NodeId, UnitRef>;

/// Second compiler pass. Builds the unit graph for `root` from the resolved
/// types side table.
pub fn generate(
    arena: &ExprArena,
    bindings: &Bindings,
    resolved: &ResolvedTypes,
    stats: &Arc<ExecutionStatistics>,
    root: NodeId,
    memo: &mut UnitMemo,
) -> Result<UnitRef> {
    for id in arena.post_order(root)? {
        if memo.contains_key(&id) {
            continue;
        }
        let unit = generate_node(arena, bindings, resolved, stats, memo, id)?;
        memo.insert(id, unit);
    }
    memo.get(&root)
        .cloned()
        .required("unit for root expression")
}

fn generate_node(
    arena: &ExprArena,
    bindings: &Bindings,
    resolved: &ResolvedTypes,
    stats: &Arc<ExecutionStatistics>,
    memo: &UnitMemo,
    id: NodeId,
) -> Result<UnitRef> {
    let unit = |child: &NodeId| -> Result<UnitRef> {
        memo.get(child)
            .cloned()
            .ok_or_else(|| DbError::new("Child generated out of order").with_field("node", child))
    };
    let units = |children: &[NodeId]| children.iter().map(unit).collect::<Result<Vec<_>>>();
    let datatype = resolved.datatype(id)?;
    let stats = stats.clone();

    let out: UnitRef = match arena.get(id)? {
        Expr::Literal(v) => Arc::new(LiteralUnit::new(v.clone())),
        Expr::Identifier { .. } => {
            let binding = bindings.get(id).required("column binding")?;
            Arc::new(ColumnUnit {
                index: binding.index,
                datatype: binding.datatype,
            })
        }
        Expr::Binary { op, left, right } => {
            let (left, right) = (unit(left)?, unit(right)?);
            match op {
                BinaryOperator::And | BinaryOperator::Or => Arc::new(LogicalUnit {
                    op: *op,
                    left,
                    right,
                    stats,
                }),
                BinaryOperator::Like | BinaryOperator::NotLike => Arc::new(LikeUnit::new(
                    *op == BinaryOperator::NotLike,
                    left,
                    right,
                    stats,
                )),
                op => Arc::new(BinaryUnit {
                    op: *op,
                    left,
                    right,
                    datatype,
                    stats,
                }),
            }
        }
        Expr::Unary { op, operand } => Arc::new(UnaryUnit {
            op: *op,
            operand: unit(operand)?,
            datatype,
            stats,
        }),
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => Arc::new(BetweenUnit {
            value: unit(expr)?,
            low: unit(low)?,
            high: unit(high)?,
            negated: *negated,
            stats,
        }),
        Expr::InList {
            expr,
            list,
            negated,
        } => Arc::new(InListUnit {
            value: unit(expr)?,
            list: units(list)?,
            negated: *negated,
            stats,
        }),
        Expr::Case {
            operand,
            when_then,
            else_expr,
        } => Arc::new(CaseUnit {
            operand: operand.as_ref().map(unit).transpose()?,
            branches: when_then
                .iter()
                .map(|(w, t)| Ok((unit(w)?, unit(t)?)))
                .collect::<Result<Vec<_>>>()?,
            else_unit: else_expr.as_ref().map(unit).transpose()?,
            datatype,
        }),
        Expr::Cast { expr, to } => Arc::new(CastUnit {
            value: unit(expr)?,
            to: *to,
            stats,
        }),
        Expr::Coalesce(items) => Arc::new(CoalesceUnit {
            items: units(items)?,
            datatype,
        }),
        Expr::Function { args, .. } => {
            let function = resolved
                .get(id)
                .and_then(|n| n.function.clone())
                .required("resolved function")?;
            let FunctionImpl::Scalar(f) = &function.implementation else {
                return Err(DbError::compile(format!(
                    "Aggregate function '{}' cannot be evaluated per row",
                    function.signature.name
                )));
            };
            Arc::new(FunctionUnit {
                name: function.signature.name,
                function: f.clone(),
                args: bind_call_arguments(&function, args, &unit)?,
                datatype,
                stats,
            })
        }
    };

    Ok(out)
}

/// Order call site argument units to match the function's signature.
///
/// Defaults become literal units. Done once here so nothing is looked up
/// per row.
pub fn bind_call_arguments(
    function: &Function,
    args: &[FunctionArg],
    unit: &impl Fn(&NodeId) -> Result<UnitRef>,
) -> Result<Vec<UnitRef>> {
    let mut positional = Vec::new();
    let mut named = Vec::new();
    for arg in args {
        let u = unit(&arg.value)?;
        match &arg.name {
            Some(name) => named.push((name.clone(), u)),
            None => positional.push(u),
        }
    }
    function
        .signature
        .bind_arguments(&positional, &named, |default| {
            Arc::new(LiteralUnit::new(default.clone())) as UnitRef
        })
}
