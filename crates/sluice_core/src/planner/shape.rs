use sluice_error::Result;
use tracing::debug;

use super::builder::PipelineBuilder;
use crate::expr::binder::Binder;
use crate::expr::{Expr, ExprArena, NodeId};
use crate::io::{KeyCondition, QueryContext, RowsInput};
use crate::iterator::{BoxRowsIterator, RowsInputIterator};
use crate::operators::{NullOrder, SortDirection};
use crate::relational::Column;
use crate::scalar::ops::BinaryOperator;
use crate::session::ExecutionSession;

/// An output column of the select list.
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub name: String,
    pub expr: NodeId,
}

impl SelectItem {
    pub fn new(name: impl Into<String>, expr: NodeId) -> Self {
        SelectItem {
            name: name.into(),
            expr,
        }
    }
}

/// An aggregate computed by GROUP BY, exposed as a column named `name`.
#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub name: String,
    /// The aggregate function call.
    pub call: NodeId,
}

impl AggregateExpr {
    pub fn new(name: impl Into<String>, call: NodeId) -> Self {
        AggregateExpr {
            name: name.into(),
            call,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrderByExpr {
    pub expr: NodeId,
    pub direction: SortDirection,
    pub nulls: NullOrder,
}

impl OrderByExpr {
    pub fn asc(expr: NodeId) -> Self {
        OrderByExpr {
            expr,
            direction: SortDirection::Ascending,
            nulls: NullOrder::default(),
        }
    }

    pub fn desc(expr: NodeId) -> Self {
        OrderByExpr {
            expr,
            direction: SortDirection::Descending,
            nulls: NullOrder::default(),
        }
    }

    pub fn with_nulls(mut self, nulls: NullOrder) -> Self {
        self.nulls = nulls;
        self
    }
}

/// `call OVER (PARTITION BY ... ORDER BY ...)`, exposed as a column named
/// `name`.
#[derive(Debug, Clone)]
pub struct WindowExpr {
    pub name: String,
    pub call: NodeId,
    pub partition_by: Vec<NodeId>,
    pub order_by: Vec<OrderByExpr>,
}

/// Everything needed to run one SELECT over a single input.
///
/// Expressions live in `arena`. Each clause is bound against the columns
/// produced by the clauses before it, in SQL order.
#[derive(Debug, Clone, Default)]
pub struct QueryShape {
    pub arena: ExprArena,
    pub filter: Option<NodeId>,
    pub group_by: Vec<NodeId>,
    pub aggregates: Vec<AggregateExpr>,
    pub having: Option<NodeId>,
    pub windows: Vec<WindowExpr>,
    pub order_by: Vec<OrderByExpr>,
    /// Empty selects every column.
    pub select: Vec<SelectItem>,
    pub distinct: bool,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl QueryShape {
    fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregates.is_empty()
    }

    /// If offset and limit can be handed to the input. Only true when every
    /// row the input produces reaches the offset/limit stages.
    fn limit_reaches_input(&self) -> bool {
        self.filter.is_none()
            && !self.is_grouped()
            && self.having.is_none()
            && self.windows.is_empty()
            && self.order_by.is_empty()
            && !self.distinct
    }

    /// Names of input columns referenced anywhere in the query.
    fn referenced_columns(&self, input: &[Column]) -> Result<Vec<String>> {
        let roots = self
            .filter
            .iter()
            .chain(&self.group_by)
            .copied()
            .chain(self.aggregates.iter().map(|a| a.call))
            .chain(self.having)
            .chain(self.windows.iter().flat_map(|w| {
                std::iter::once(w.call)
                    .chain(w.partition_by.iter().copied())
                    .chain(w.order_by.iter().map(|o| o.expr))
            }))
            .chain(self.order_by.iter().map(|o| o.expr))
            .chain(self.select.iter().map(|s| s.expr));

        let mut names = Vec::new();
        for root in roots {
            for id in self.arena.post_order(root)? {
                let Expr::Identifier { name, .. } = self.arena.get(id)? else {
                    continue;
                };
                let Some(column) = input.iter().find(|c| c.name.eq_ignore_ascii_case(name)) else {
                    // Refers to a column produced by the pipeline.
                    continue;
                };
                if !names.contains(&column.name) {
                    names.push(column.name.clone());
                }
            }
        }
        Ok(names)
    }

    /// Conditions of the form `column op literal` in the top level
    /// conjunction of the WHERE clause that the input can evaluate itself.
    fn key_conditions(&self, input: &dyn RowsInput) -> Result<Vec<KeyCondition>> {
        let Some(filter) = self.filter else {
            return Ok(Vec::new());
        };
        if input.key_columns().is_empty() {
            return Ok(Vec::new());
        }

        let bindings = Binder::new(input.columns()).bind_all(&self.arena, [filter])?;
        let mut conditions = Vec::new();
        let mut stack = vec![filter];
        while let Some(id) = stack.pop() {
            let Expr::Binary { op, left, right } = self.arena.get(id)? else {
                continue;
            };
            if *op == BinaryOperator::And {
                stack.push(*right);
                stack.push(*left);
                continue;
            }

            let (column, value, op) = match (self.arena.get(*left)?, self.arena.get(*right)?) {
                (Expr::Identifier { .. }, Expr::Literal(value)) => (*left, value, Some(*op)),
                (Expr::Literal(value), Expr::Identifier { .. }) => (*right, value, commute(*op)),
                _ => continue,
            };
            let (Some(binding), Some(op)) = (bindings.get(column), op) else {
                continue;
            };
            let supported = input
                .key_columns()
                .iter()
                .any(|k| k.column_index == binding.index && k.supports(op));
            if supported && !value.is_null() {
                conditions.push(KeyCondition {
                    column_index: binding.index,
                    operator: op,
                    value: value.clone(),
                });
            }
        }
        Ok(conditions)
    }

    /// Build the pipeline for this query reading from `input`.
    ///
    /// Pushes what it can into the input first (key conditions, referenced
    /// columns, offset and limit), then stacks operators in SQL order:
    /// WHERE, GROUP BY, HAVING, WINDOW, ORDER BY, SELECT, DISTINCT, OFFSET,
    /// LIMIT.
    pub fn plan(
        &self,
        session: &ExecutionSession,
        input: Box<dyn RowsInput>,
    ) -> Result<BoxRowsIterator> {
        let mut input = session.wrap_input(input);

        let conditions = self.key_conditions(input.as_ref())?;
        for condition in &conditions {
            debug!(%condition, source = input.source_name(), "pushing down key condition");
            input.set_key_column_value(condition.clone())?;
        }

        let mut context = QueryContext {
            columns: if self.select.is_empty() {
                Vec::new()
            } else {
                self.referenced_columns(input.columns())?
            },
            ..Default::default()
        };
        if self.limit_reaches_input() {
            context.offset = self.offset;
            context.limit = self.limit;
        }
        input.set_query_context(context);

        let leaf = RowsInputIterator::new(
            input,
            session.statistics().clone(),
            session.cancellation_token().clone(),
        );
        let builder = self.build_stages(PipelineBuilder::new(session, Box::new(leaf)))?;
        debug!(stages = ?builder.stages(), pushed_down = conditions.len(), "planned query");

        Ok(builder.build())
    }

    /// Apply every clause to a builder.
    pub fn build_stages<'a>(&self, builder: PipelineBuilder<'a>) -> Result<PipelineBuilder<'a>> {
        let arena = &self.arena;
        let mut builder = builder;

        if let Some(filter) = self.filter {
            builder = builder.filter(arena, filter)?;
        }
        if self.is_grouped() {
            builder = builder.group_by(arena, &self.group_by, &self.aggregates)?;
        }
        if let Some(having) = self.having {
            builder = builder.having(arena, having)?;
        }
        builder = builder.window(arena, &self.windows)?;
        builder = builder.order_by(arena, &self.order_by)?;
        if !self.select.is_empty() {
            builder = builder.project(arena, &self.select)?;
        }
        if self.distinct {
            builder = builder.distinct();
        }
        builder = builder.offset(self.offset);
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }

        Ok(builder)
    }
}

/// Operator to use when swapping the operands of a comparison.
fn commute(op: BinaryOperator) -> Option<BinaryOperator> {
    Some(match op {
        BinaryOperator::Equal => BinaryOperator::Equal,
        BinaryOperator::NotEqual => BinaryOperator::NotEqual,
        BinaryOperator::Less => BinaryOperator::Greater,
        BinaryOperator::LessOrEqual => BinaryOperator::GreaterOrEqual,
        BinaryOperator::Greater => BinaryOperator::Less,
        BinaryOperator::GreaterOrEqual => BinaryOperator::LessOrEqual,
        _ => return None,
    })
}
