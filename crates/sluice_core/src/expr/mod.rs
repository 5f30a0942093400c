//! Expression trees.
//!
//! Nodes live in an `ExprArena` and reference their children by `NodeId`.
//! Metadata computed about nodes (bindings, resolved types) is kept in side
//! tables keyed by `NodeId` rather than on the nodes themselves.

pub mod binder;

use std::fmt;

use hashbrown::HashSet;
use sluice_error::{DbError, Result};

use crate::scalar::ops::{BinaryOperator, UnaryOperator};
use crate::scalar::{DataType, ScalarValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArg {
    /// Set for named arguments (`name => value`).
    pub name: Option<String>,
    pub value: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ScalarValue),
    Identifier {
        name: String,
        source: Option<String>,
    },
    Binary {
        op: BinaryOperator,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOperator,
        operand: NodeId,
    },
    Between {
        expr: NodeId,
        low: NodeId,
        high: NodeId,
        negated: bool,
    },
    InList {
        expr: NodeId,
        list: Vec<NodeId>,
        negated: bool,
    },
    Case {
        /// Operand for the simple form (`CASE x WHEN 1 THEN ...`).
        operand: Option<NodeId>,
        when_then: Vec<(NodeId, NodeId)>,
        else_expr: Option<NodeId>,
    },
    Cast {
        expr: NodeId,
        to: DataType,
    },
    Coalesce(Vec<NodeId>),
    Function {
        name: String,
        args: Vec<FunctionArg>,
    },
}

impl Expr {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "literal",
            Self::Identifier { .. } => "identifier",
            Self::Binary { .. } => "binary",
            Self::Unary { .. } => "unary",
            Self::Between { .. } => "between",
            Self::InList { .. } => "in",
            Self::Case { .. } => "case",
            Self::Cast { .. } => "cast",
            Self::Coalesce(_) => "coalesce",
            Self::Function { .. } => "function",
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Self::Literal(_) | Self::Identifier { .. } => Vec::new(),
            Self::Binary { left, right, .. } => vec![*left, *right],
            Self::Unary { operand, .. } => vec![*operand],
            Self::Between {
                expr, low, high, ..
            } => vec![*expr, *low, *high],
            Self::InList { expr, list, .. } => {
                let mut out = Vec::with_capacity(list.len() + 1);
                out.push(*expr);
                out.extend(list.iter().copied());
                out
            }
            Self::Case {
                operand,
                when_then,
                else_expr,
            } => {
                let mut out: Vec<_> = operand.iter().copied().collect();
                for (when, then) in when_then {
                    out.push(*when);
                    out.push(*then);
                }
                out.extend(else_expr.iter().copied());
                out
            }
            Self::Cast { expr, .. } => vec![*expr],
            Self::Coalesce(items) => items.clone(),
            Self::Function { args, .. } => args.iter().map(|a| a.value).collect(),
        }
    }
}

/// Arena holding expression nodes.
///
/// Nodes may be shared by more than one parent.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, expr: Expr) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(expr);
        id
    }

    pub fn get(&self, id: NodeId) -> Result<&Expr> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| DbError::new("Missing expression node").with_field("node", id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes reachable from `root` in post-order (children before parents).
    ///
    /// Shared nodes are only visited once.
    pub fn post_order(&self, root: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        // (node, children pushed)
        let mut stack = vec![(root, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            let children = self.get(id)?.children();
            for child in children.into_iter().rev() {
                if !visited.contains(&child) {
                    stack.push((child, false));
                }
            }
        }

        Ok(out)
    }

    /// Build the parent table for every node in the arena.
    ///
    /// For shared nodes, the first parent encountered is recorded.
    pub fn parents(&self) -> ParentTable {
        let mut parents = vec![None; self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            for child in node.children() {
                if let Some(slot) = parents.get_mut(child.index()) {
                    slot.get_or_insert(NodeId(idx as u32));
                }
            }
        }
        ParentTable { parents }
    }

    pub fn display(&self, id: NodeId) -> DisplayExpr<'_> {
        DisplayExpr { arena: self, id }
    }

    pub fn lit(&mut self, value: impl Into<ScalarValue>) -> NodeId {
        self.add(Expr::Literal(value.into()))
    }

    pub fn col(&mut self, name: impl Into<String>) -> NodeId {
        self.add(Expr::Identifier {
            name: name.into(),
            source: None,
        })
    }

    pub fn qualified_col(&mut self, source: impl Into<String>, name: impl Into<String>) -> NodeId {
        self.add(Expr::Identifier {
            name: name.into(),
            source: Some(source.into()),
        })
    }

    pub fn binary(&mut self, op: BinaryOperator, left: NodeId, right: NodeId) -> NodeId {
        self.add(Expr::Binary { op, left, right })
    }

    pub fn unary(&mut self, op: UnaryOperator, operand: NodeId) -> NodeId {
        self.add(Expr::Unary { op, operand })
    }

    pub fn cast(&mut self, expr: NodeId, to: DataType) -> NodeId {
        self.add(Expr::Cast { expr, to })
    }

    /// Function call with positional arguments.
    pub fn call(&mut self, name: impl Into<String>, args: impl IntoIterator<Item = NodeId>) -> NodeId {
        let args = args
            .into_iter()
            .map(|value| FunctionArg { name: None, value })
            .collect();
        self.add(Expr::Function {
            name: name.into(),
            args,
        })
    }
}

/// Parent lookups, computed once per arena.
#[derive(Debug, Clone)]
pub struct ParentTable {
    parents: Vec<Option<NodeId>>,
}

impl ParentTable {
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    /// Walk parents up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }
}

pub struct DisplayExpr<'a> {
    arena: &'a ExprArena,
    id: NodeId,
}

impl DisplayExpr<'_> {
    fn child(&self, id: NodeId) -> Self {
        DisplayExpr {
            arena: self.arena,
            id,
        }
    }
}

impl fmt::Display for DisplayExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(expr) = self.arena.get(self.id) else {
            return write!(f, "<missing {}>", self.id);
        };
        match expr {
            Expr::Literal(ScalarValue::String(s)) => write!(f, "'{s}'"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Identifier { name, source } => match source {
                Some(source) => write!(f, "{source}.{name}"),
                None => write!(f, "{name}"),
            },
            Expr::Binary { op, left, right } => {
                write!(f, "({} {op} {})", self.child(*left), self.child(*right))
            }
            Expr::Unary { op, operand } => match op {
                UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                    write!(f, "{} {op}", self.child(*operand))
                }
                _ => write!(f, "{op} {}", self.child(*operand)),
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(
                    f,
                    "{} {not}BETWEEN {} AND {}",
                    self.child(*expr),
                    self.child(*low),
                    self.child(*high)
                )
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {not}IN (", self.child(*expr))?;
                for (idx, item) in list.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.child(*item))?;
                }
                write!(f, ")")
            }
            Expr::Case {
                operand,
                when_then,
                else_expr,
            } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", self.child(*operand))?;
                }
                for (when, then) in when_then {
                    write!(f, " WHEN {} THEN {}", self.child(*when), self.child(*then))?;
                }
                if let Some(else_expr) = else_expr {
                    write!(f, " ELSE {}", self.child(*else_expr))?;
                }
                write!(f, " END")
            }
            Expr::Cast { expr, to } => write!(f, "CAST({} AS {to})", self.child(*expr)),
            Expr::Coalesce(items) => {
                write!(f, "COALESCE(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.child(*item))?;
                }
                write!(f, ")")
            }
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(arg_name) = &arg.name {
                        write!(f, "{arg_name} => ")?;
                    }
                    write!(f, "{}", self.child(arg.value))?;
                }
                write!(f, ")")
            }
        }
    }
}
