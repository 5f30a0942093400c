use std::sync::Arc;

use hashbrown::HashMap;
use sluice_error::{DbError, Result};

use crate::expr::binder::Bindings;
use crate::expr::{Expr, ExprArena, FunctionArg, NodeId};
use crate::functions::{ArgumentTypes, Function, FunctionRegistry};
use crate::scalar::DataType;
use crate::scalar::ops::BinaryOperator;

/// What type resolution learned about a node.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub datatype: DataType,
    /// Set for function calls.
    pub function: Option<Arc<Function>>,
    pub arg_types: Option<ArgumentTypes>,
}

impl ResolvedNode {
    fn typed(datatype: DataType) -> Self {
        ResolvedNode {
            datatype,
            function: None,
            arg_types: None,
        }
    }
}

/// Side table filled by type resolution, keyed by node.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTypes {
    nodes: HashMap<NodeId, ResolvedNode>,
}

impl ResolvedTypes {
    pub fn get(&self, id: NodeId) -> Option<&ResolvedNode> {
        self.nodes.get(&id)
    }

    pub fn datatype(&self, id: NodeId) -> Result<DataType> {
        self.nodes
            .get(&id)
            .map(|n| n.datatype)
            .ok_or_else(|| DbError::new("Node has not been resolved").with_field("node", id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn insert(&mut self, id: NodeId, node: ResolvedNode) {
        self.nodes.insert(id, node);
    }
}

/// Where an expression is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveContext {
    /// Per row evaluation. Aggregate calls are rejected.
    Scalar,
    /// The root may be an aggregate call. Its arguments are still scalar.
    AggregateRoot,
}

/// First compiler pass. Assigns a type to every node reachable from `root`.
pub fn resolve(
    registry: &FunctionRegistry,
    arena: &ExprArena,
    bindings: &Bindings,
    root: NodeId,
    context: ResolveContext,
    resolved: &mut ResolvedTypes,
) -> Result<()> {
    for id in arena.post_order(root)? {
        if resolved.contains(id) {
            continue;
        }
        let node = resolve_node(registry, arena, bindings, resolved, id)?;
        if let Some(f) = &node.function {
            if f.is_aggregate() && !(context == ResolveContext::AggregateRoot && id == root) {
                return Err(DbError::compile(format!(
                    "Aggregate function '{}' is not allowed here",
                    f.signature.name
                ))
                .with_field("expression", arena.display(root)));
            }
        }
        resolved.insert(id, node);
    }
    Ok(())
}

fn resolve_node(
    registry: &FunctionRegistry,
    arena: &ExprArena,
    bindings: &Bindings,
    resolved: &ResolvedTypes,
    id: NodeId,
) -> Result<ResolvedNode> {
    let ty = |child: NodeId| resolved.datatype(child);

    let datatype = match arena.get(id)? {
        Expr::Literal(v) => v.datatype(),
        Expr::Identifier { name, source } => match bindings.get(id) {
            Some(binding) => binding.datatype,
            None => {
                let full = match source {
                    Some(source) => format!("{source}.{name}"),
                    None => name.clone(),
                };
                return Err(DbError::compile(format!("Cannot find identifier '{full}'")));
            }
        },
        Expr::Binary { op, left, right } => binary_type(*op, ty(*left)?, ty(*right)?)?,
        Expr::Unary { op, operand } => {
            let operand = ty(*operand)?;
            op.result_type(operand).ok_or_else(|| {
                DbError::compile(format!("Cannot apply operator '{op}'"))
                    .with_field("operand", operand)
            })?
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            let t = ty(*expr)?;
            binary_type(BinaryOperator::GreaterOrEqual, t, ty(*low)?)?;
            binary_type(BinaryOperator::LessOrEqual, t, ty(*high)?)?;
            DataType::Boolean
        }
        Expr::InList { expr, list, .. } => {
            let t = ty(*expr)?;
            for item in list {
                binary_type(BinaryOperator::Equal, t, ty(*item)?)?;
            }
            DataType::Boolean
        }
        Expr::Case {
            operand,
            when_then,
            else_expr,
        } => {
            for (when, _) in when_then {
                let when = ty(*when)?;
                match operand {
                    Some(operand) => {
                        binary_type(BinaryOperator::Equal, ty(*operand)?, when)?;
                    }
                    None => {
                        if !matches!(when, DataType::Boolean | DataType::Null | DataType::Any) {
                            return Err(DbError::compile("CASE condition must be a boolean")
                                .with_field("type", when));
                        }
                    }
                }
            }
            let branches = when_then
                .iter()
                .map(|(_, then)| *then)
                .chain(else_expr.iter().copied())
                .map(ty)
                .collect::<Result<Vec<_>>>()?;
            common_type("CASE", &branches)?
        }
        Expr::Cast { to, .. } => *to,
        Expr::Coalesce(items) => {
            let types = items.iter().map(|i| ty(*i)).collect::<Result<Vec<_>>>()?;
            common_type("COALESCE", &types)?
        }
        Expr::Function { name, args } => {
            let arg_types = argument_types(args, &ty)?;
            let function = registry.find(name, &arg_types)?;
            let datatype = function.signature.resolve_return_type(&arg_types);
            return Ok(ResolvedNode {
                datatype,
                function: Some(function),
                arg_types: Some(arg_types),
            });
        }
    };

    Ok(ResolvedNode::typed(datatype))
}

fn binary_type(op: BinaryOperator, left: DataType, right: DataType) -> Result<DataType> {
    op.result_type(left, right).ok_or_else(|| {
        DbError::compile(format!("Cannot apply operator '{op}'"))
            .with_field("left", left)
            .with_field("right", right)
    })
}

/// Type of a set of branches. The first concrete type wins, the rest must
/// agree with it (numeric types agree with each other).
fn common_type(what: &str, types: &[DataType]) -> Result<DataType> {
    let Some(first) = types.iter().copied().find(|t| t.is_row_type()) else {
        return Ok(types.first().copied().unwrap_or(DataType::Null));
    };
    for &t in types {
        let compatible =
            !t.is_row_type() || t == first || (t.is_numeric() && first.is_numeric());
        if !compatible {
            return Err(DbError::compile(format!("{what} branches have different types"))
                .with_field("expected", first)
                .with_field("got", t));
        }
    }
    Ok(first)
}

fn argument_types(
    args: &[FunctionArg],
    ty: &impl Fn(NodeId) -> Result<DataType>,
) -> Result<ArgumentTypes> {
    let mut out = ArgumentTypes::default();
    for arg in args {
        let t = ty(arg.value)?;
        match &arg.name {
            Some(name) => out.named.push((name.clone(), t)),
            None => {
                if !out.named.is_empty() {
                    return Err(DbError::compile(
                        "Positional arguments cannot follow named arguments",
                    ));
                }
                out.positional.push(t)
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::binder::Binder;
    use crate::relational::schema;
    use crate::scalar::ScalarValue;

    fn resolve_root(arena: &ExprArena, root: NodeId) -> Result<ResolvedTypes> {
        let cols = schema([("a", DataType::Integer), ("s", DataType::String)]);
        let bindings = Binder::new(&cols).bind_all(arena, [root])?;
        let registry = FunctionRegistry::with_builtins();
        let mut resolved = ResolvedTypes::default();
        resolve(
            &registry,
            arena,
            &bindings,
            root,
            ResolveContext::Scalar,
            &mut resolved,
        )?;
        Ok(resolved)
    }

    #[test]
    fn arithmetic_types() {
        let mut arena = ExprArena::new();
        let a = arena.col("a");
        let half = arena.lit(0.5);
        let root = arena.binary(BinaryOperator::Multiply, a, half);
        let resolved = resolve_root(&arena, root).unwrap();
        assert_eq!(DataType::Float, resolved.datatype(root).unwrap());
    }

    #[test]
    fn cannot_apply_operator() {
        let mut arena = ExprArena::new();
        let s = arena.col("s");
        let one = arena.lit(1);
        let root = arena.binary(BinaryOperator::Subtract, s, one);
        let err = resolve_root(&arena, root).unwrap_err();
        assert!(err.get_msg().contains("Cannot apply operator"));
        assert_eq!(Some("String"), err.get_field("left"));
    }

    #[test]
    fn unbound_identifier() {
        let mut arena = ExprArena::new();
        let root = arena.col("missing");
        let err = resolve_root(&arena, root).unwrap_err();
        assert_eq!("Cannot find identifier 'missing'", err.get_msg());
    }

    #[test]
    fn generic_return_type() {
        let mut arena = ExprArena::new();
        let null = arena.lit(ScalarValue::Null);
        let s = arena.col("s");
        let root = arena.call("coalesce", [null, s]);
        let resolved = resolve_root(&arena, root).unwrap();
        assert_eq!(DataType::String, resolved.datatype(root).unwrap());
    }

    #[test]
    fn aggregate_rejected_in_scalar_context() {
        let mut arena = ExprArena::new();
        let a = arena.col("a");
        let root = arena.call("sum", [a]);
        let err = resolve_root(&arena, root).unwrap_err();
        assert!(err.get_msg().contains("not allowed"));
    }

    #[test]
    fn case_branch_mismatch() {
        let mut arena = ExprArena::new();
        let cond = arena.lit(true);
        let one = arena.lit(1);
        let s = arena.col("s");
        let root = arena.add(Expr::Case {
            operand: None,
            when_then: vec![(cond, one)],
            else_expr: Some(s),
        });
        resolve_root(&arena, root).unwrap_err();
    }
}
