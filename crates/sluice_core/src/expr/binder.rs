use hashbrown::HashMap;
use sluice_error::Result;

use super::{Expr, ExprArena, NodeId};
use crate::relational::{Column, find_column_index};
use crate::scalar::DataType;

/// Column an identifier node resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBinding {
    pub index: usize,
    pub datatype: DataType,
}

/// Side table mapping identifier nodes to the columns they reference.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    columns: HashMap<NodeId, ColumnBinding>,
}

impl Bindings {
    pub fn get(&self, id: NodeId) -> Option<ColumnBinding> {
        self.columns.get(&id).copied()
    }

    pub fn insert(&mut self, id: NodeId, binding: ColumnBinding) {
        self.columns.insert(id, binding);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Binds identifiers to columns of a schema.
///
/// Identifiers that don't match any column are left unbound. It's up to the
/// compiler to reject them. Ambiguous names are an error.
#[derive(Debug)]
pub struct Binder<'a> {
    columns: &'a [Column],
}

impl<'a> Binder<'a> {
    pub fn new(columns: &'a [Column]) -> Self {
        Binder { columns }
    }

    pub fn bind(&self, arena: &ExprArena, root: NodeId, bindings: &mut Bindings) -> Result<()> {
        for id in arena.post_order(root)? {
            if let Expr::Identifier { name, source } = arena.get(id)? {
                if let Some(index) = find_column_index(self.columns, name, source.as_deref())? {
                    bindings.insert(
                        id,
                        ColumnBinding {
                            index,
                            datatype: self.columns[index].datatype,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    pub fn bind_all(
        &self,
        arena: &ExprArena,
        roots: impl IntoIterator<Item = NodeId>,
    ) -> Result<Bindings> {
        let mut bindings = Bindings::default();
        for root in roots {
            self.bind(arena, root, &mut bindings)?;
        }
        Ok(bindings)
    }
}
