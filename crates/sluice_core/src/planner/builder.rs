use std::sync::Arc;

use sluice_error::Result;
use tracing::trace;

use super::shape::{AggregateExpr, OrderByExpr, SelectItem, WindowExpr};
use crate::compiler::Compiler;
use crate::explain::explain_pipeline;
use crate::expr::binder::{Binder, Bindings};
use crate::expr::{ExprArena, NodeId};
use crate::iterator::BoxRowsIterator;
use crate::operators::{
    AggregateTarget,
    CombineRowsIterator,
    CombineType,
    DistinctRowsIterator,
    FilterRowsIterator,
    GroupRowsIterator,
    JoinType,
    LimitRowsIterator,
    NestedLoopJoinRowsIterator,
    OffsetRowsIterator,
    OrderKey,
    OrderRowsIterator,
    ProjectItem,
    ProjectRowsIterator,
    StatisticRowsIterator,
    WindowRowsIterator,
    WindowSpec,
    join_columns,
};
use crate::relational::Column;
use crate::session::ExecutionSession;

/// Stacks operators on top of a leaf iterator.
///
/// Each stage binds and compiles its expressions against the columns of the
/// pipeline as it is at that point, so stages must be applied in the order
/// the query needs them. Every stage gets a fresh compiler.
#[derive(Debug)]
pub struct PipelineBuilder<'a> {
    session: &'a ExecutionSession,
    iter: BoxRowsIterator,
    stages: Vec<&'static str>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(session: &'a ExecutionSession, iter: BoxRowsIterator) -> Self {
        PipelineBuilder {
            session,
            iter,
            stages: Vec::new(),
        }
    }

    /// Columns produced by the pipeline so far.
    pub fn columns(&self) -> &Arc<[Column]> {
        self.iter.columns()
    }

    /// Names of the stages applied so far, bottom up.
    pub fn stages(&self) -> &[&'static str] {
        &self.stages
    }

    fn compiler(&self) -> Compiler<'a> {
        let session = self.session;
        Compiler::new(session.registry(), session.statistics().clone())
    }

    fn bind(&self, arena: &ExprArena, roots: impl IntoIterator<Item = NodeId>) -> Result<Bindings> {
        Binder::new(self.iter.columns()).bind_all(arena, roots)
    }

    fn stage(
        self,
        name: &'static str,
        wrap: impl FnOnce(BoxRowsIterator) -> BoxRowsIterator,
    ) -> Self {
        let PipelineBuilder {
            session,
            iter,
            mut stages,
        } = self;
        let iter = wrap(iter);
        trace!(stage = name, columns = iter.columns().len(), "added pipeline stage");
        stages.push(name);
        PipelineBuilder {
            session,
            iter,
            stages,
        }
    }

    fn compile_order_keys(
        compiler: &mut Compiler,
        arena: &ExprArena,
        bindings: &Bindings,
        order_by: &[OrderByExpr],
    ) -> Result<Vec<OrderKey>> {
        order_by
            .iter()
            .map(|o| {
                let unit = compiler.compile(arena, bindings, o.expr)?;
                Ok(OrderKey::new(unit, o.direction, o.nulls))
            })
            .collect()
    }

    /// Keep rows where `predicate` is true.
    pub fn filter(self, arena: &ExprArena, predicate: NodeId) -> Result<Self> {
        let bindings = self.bind(arena, [predicate])?;
        let unit = self.compiler().compile(arena, &bindings, predicate)?;
        Ok(self.stage("filter", |child| {
            Box::new(FilterRowsIterator::new(child, unit))
        }))
    }

    /// Group by `keys`, computing `aggregates` per group.
    ///
    /// Aggregate results are appended to the input columns under their
    /// names, so later stages can refer to them.
    pub fn group_by(
        self,
        arena: &ExprArena,
        keys: &[NodeId],
        aggregates: &[AggregateExpr],
    ) -> Result<Self> {
        let roots = keys.iter().copied().chain(aggregates.iter().map(|a| a.call));
        let bindings = self.bind(arena, roots)?;

        let mut compiler = self.compiler();
        let keys = compiler.compile_many(arena, &bindings, keys)?;
        let targets = aggregates
            .iter()
            .map(|a| {
                let aggregate = compiler.compile_aggregate(arena, &bindings, a.call)?;
                Ok(AggregateTarget::new(&a.name, aggregate))
            })
            .collect::<Result<Vec<_>>>()?;

        let stats = self.session.statistics().clone();
        Ok(self.stage("group", |child| {
            Box::new(GroupRowsIterator::new(child, keys, targets, stats))
        }))
    }

    /// Filter applied after grouping.
    pub fn having(self, arena: &ExprArena, predicate: NodeId) -> Result<Self> {
        let mut builder = self.filter(arena, predicate)?;
        if let Some(last) = builder.stages.last_mut() {
            *last = "having";
        }
        Ok(builder)
    }

    pub fn window(self, arena: &ExprArena, windows: &[WindowExpr]) -> Result<Self> {
        if windows.is_empty() {
            return Ok(self);
        }
        let roots = windows.iter().flat_map(|w| {
            std::iter::once(w.call)
                .chain(w.partition_by.iter().copied())
                .chain(w.order_by.iter().map(|o| o.expr))
        });
        let bindings = self.bind(arena, roots)?;

        let mut compiler = self.compiler();
        let specs = windows
            .iter()
            .map(|w| {
                let aggregate = compiler.compile_aggregate(arena, &bindings, w.call)?;
                let partition_by = compiler.compile_many(arena, &bindings, &w.partition_by)?;
                let order_by =
                    Self::compile_order_keys(&mut compiler, arena, &bindings, &w.order_by)?;
                Ok(WindowSpec::new(&w.name, aggregate)
                    .with_partition_by(partition_by)
                    .with_order_by(order_by))
            })
            .collect::<Result<Vec<_>>>()?;

        let stats = self.session.statistics().clone();
        Ok(self.stage("window", |child| {
            Box::new(WindowRowsIterator::new(child, specs, stats))
        }))
    }

    pub fn order_by(self, arena: &ExprArena, order_by: &[OrderByExpr]) -> Result<Self> {
        if order_by.is_empty() {
            return Ok(self);
        }
        let bindings = self.bind(arena, order_by.iter().map(|o| o.expr))?;
        let keys = Self::compile_order_keys(&mut self.compiler(), arena, &bindings, order_by)?;
        Ok(self.stage("order", |child| {
            Box::new(OrderRowsIterator::new(child, keys))
        }))
    }

    pub fn project(self, arena: &ExprArena, items: &[SelectItem]) -> Result<Self> {
        let bindings = self.bind(arena, items.iter().map(|i| i.expr))?;
        let mut compiler = self.compiler();
        let items = items
            .iter()
            .map(|i| {
                let unit = compiler.compile(arena, &bindings, i.expr)?;
                Ok(ProjectItem::new(&i.name, unit))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.stage("project", |child| {
            Box::new(ProjectRowsIterator::new(child, items))
        }))
    }

    pub fn distinct(self) -> Self {
        self.stage("distinct", |child| Box::new(DistinctRowsIterator::new(child)))
    }

    pub fn offset(self, count: u64) -> Self {
        if count == 0 {
            return self;
        }
        self.stage("offset", |child| {
            Box::new(OffsetRowsIterator::new(child, count))
        })
    }

    pub fn limit(self, count: u64) -> Self {
        self.stage("limit", |child| Box::new(LimitRowsIterator::new(child, count)))
    }

    /// Combine with another pipeline. Fails if the shapes differ.
    pub fn combine(self, other: BoxRowsIterator, combine_type: CombineType) -> Result<Self> {
        let PipelineBuilder {
            session,
            iter,
            stages,
        } = self;
        let iter = CombineRowsIterator::try_new(iter, other, combine_type)?;
        let builder = PipelineBuilder {
            session,
            iter: Box::new(iter),
            stages,
        };
        // Stage with a no-op wrap to record it.
        Ok(builder.stage("combine", |iter| iter))
    }

    /// Join with `right`. The predicate sees the columns of this pipeline
    /// followed by the columns of `right`.
    pub fn join(
        self,
        right: BoxRowsIterator,
        join_type: JoinType,
        arena: &ExprArena,
        predicate: NodeId,
    ) -> Result<Self> {
        let columns = join_columns(self.iter.columns(), right.columns());
        let unit = self
            .compiler()
            .compile_for_schema(arena, &columns, predicate)?;
        Ok(self.stage("join", |left| {
            Box::new(NestedLoopJoinRowsIterator::new(left, right, join_type, unit))
        }))
    }

    /// Explain the pipeline built so far.
    pub fn explain(&self) -> String {
        explain_pipeline(
            self.iter.as_ref(),
            self.session.config().execution_config().verbose_explain,
        )
    }

    /// Finish the pipeline, putting the max error gate on top.
    pub fn build(self) -> BoxRowsIterator {
        let conf = self.session.config().execution_config();
        trace!(stages = ?self.stages, max_errors = ?conf.max_errors, "built pipeline");
        Box::new(StatisticRowsIterator::new(
            self.iter,
            self.session.statistics().clone(),
            conf.max_errors,
        ))
    }

    /// Finish the pipeline without the statistic iterator.
    pub fn into_inner(self) -> BoxRowsIterator {
        self.iter
    }
}
