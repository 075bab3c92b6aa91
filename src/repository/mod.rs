//! The closure-table engine.
//!
//! Reads live in [`query`], writes in [`mutate`]. Every call re-reads the
//! path table; nothing about tree shape is cached between calls.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait};

use crate::config::{ClosureTableConfig, ClosureTableOptions};
use crate::error::ClosureTableError;
use crate::lock::LockedTransaction;
use crate::model::TreePath;
use crate::observer::{ObserverSlot, TreeEvent, TreeObserver};
use crate::traits::ClosureTableModel;

mod mutate;
mod query;

pub use mutate::Reparented;

/// Repository exposing the closure-table operations for a given model.
///
/// The engine is not internally synchronised. Each mutating method runs in
/// its own [`LockedTransaction`]; pass a `DatabaseTransaction` as the
/// connection to make it part of a larger unit of work (it then runs in a
/// savepoint).
///
/// Observer events fire when the method's own transaction commits. Inside a
/// caller's transaction that is the savepoint release, so events for work the
/// caller later rolls back have already been delivered.
#[derive(Debug, Clone)]
pub struct ClosureTableRepository<M>
where
    M: ClosureTableModel,
{
    config: ClosureTableConfig,
    observer: ObserverSlot<M::Id>,
    _marker: PhantomData<M>,
}

impl<M> Default for ClosureTableRepository<M>
where
    M: ClosureTableModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ClosureTableRepository<M>
where
    M: ClosureTableModel,
{
    pub fn new() -> Self {
        Self::with_config(M::closure_table_config().clone())
    }

    pub fn with_config(config: ClosureTableConfig) -> Self {
        Self {
            config,
            observer: ObserverSlot::empty(),
            _marker: PhantomData,
        }
    }

    /// Override parts of the model's static configuration for this repository.
    pub fn with_options(mut self, options: ClosureTableOptions) -> Self {
        self.config = options.apply(self.config);
        self
    }

    /// Register a hook invoked after each committed mutation.
    pub fn with_observer(mut self, observer: impl TreeObserver<M::Id> + 'static) -> Self {
        self.observer.set(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &ClosureTableConfig {
        &self.config
    }

    pub(crate) fn emit(&self, event: TreeEvent<M::Id>) {
        self.observer.notify(event);
    }

    pub(crate) async fn begin<C>(&self, conn: &C) -> Result<LockedTransaction, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        LockedTransaction::acquire(self.config.advisory_lock_strategy(), conn).await
    }

    /// Load nodes by id, keeping the order of `ids`.
    pub(crate) async fn nodes_in_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: Vec<M::Id>,
    ) -> Result<Vec<M>, ClosureTableError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let values = ids.iter().map(M::id_to_value).collect::<Vec<_>>();
        let mut by_id: HashMap<M::Id, M> = M::Entity::find()
            .filter(M::id_column().is_in(values))
            .all(conn)
            .await?
            .into_iter()
            .map(|model| (model.id(), model))
            .collect();

        ids.iter()
            .map(|id| {
                by_id.remove(id).ok_or_else(|| {
                    ClosureTableError::invariant(format!("path references missing node {id}"))
                })
            })
            .collect()
    }
}

pub(crate) fn to_paths<M: ClosureTableModel>(
    rows: Vec<M::PathModel>,
) -> Result<Vec<TreePath<M::Id>>, ClosureTableError> {
    rows.iter().map(M::path_from_model).collect()
}
