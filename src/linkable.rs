//! Link nodes: nodes that alias another node instead of owning children.

use std::collections::HashSet;
use std::ops::Deref;

use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use tracing::info;

use crate::config::ClosureTableOptions;
use crate::error::ClosureTableError;
use crate::model::NodeKind;
use crate::observer::{TreeEvent, TreeObserver};
use crate::repository::ClosureTableRepository;
use crate::traits::LinkableModel;

/// [`ClosureTableRepository`] with the link rules layered on top.
///
/// Every core operation is reachable through `Deref`. Node removal is
/// overridden so that a node still targeted by a link is never deleted.
#[derive(Debug, Clone)]
pub struct LinkableRepository<M>
where
    M: LinkableModel,
{
    inner: ClosureTableRepository<M>,
}

impl<M> Default for LinkableRepository<M>
where
    M: LinkableModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Deref for LinkableRepository<M>
where
    M: LinkableModel,
{
    type Target = ClosureTableRepository<M>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<M> From<ClosureTableRepository<M>> for LinkableRepository<M>
where
    M: LinkableModel,
{
    fn from(inner: ClosureTableRepository<M>) -> Self {
        Self { inner }
    }
}

impl<M> LinkableRepository<M>
where
    M: LinkableModel,
{
    pub fn new() -> Self {
        ClosureTableRepository::new().into()
    }

    pub fn with_options(self, options: ClosureTableOptions) -> Self {
        self.inner.with_options(options).into()
    }

    pub fn with_observer(self, observer: impl TreeObserver<M::Id> + 'static) -> Self {
        self.inner.with_observer(observer).into()
    }

    pub fn is_link(&self, node: &M) -> bool {
        node.node_kind().is_link()
    }

    pub fn is_dead_link(&self, node: &M) -> bool {
        node.node_kind().is_dead_link()
    }

    /// Point `node` at `target`, turning it into a link, or back into a
    /// normal node when `target` is `None`. Returns the updated row.
    pub async fn set_link<C>(
        &self,
        conn: &C,
        node: &M,
        target: Option<&M>,
    ) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.inner.begin(conn).await?;
        let result = self.set_link_on(guard.connection(), node, target).await;
        let updated = guard.finish(result).await?;

        let target_id = target.map(M::id);
        info!(node = %node.id(), target = ?target_id, "changed link");
        self.inner.emit(TreeEvent::LinkChanged {
            node: node.id(),
            target: target_id,
        });
        Ok(updated)
    }

    pub async fn add_link_to<C>(&self, conn: &C, node: &M, target: &M) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.set_link(conn, node, Some(target)).await
    }

    pub async fn remove_link_to<C>(&self, conn: &C, node: &M) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.set_link(conn, node, None).await
    }

    async fn set_link_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
        target: Option<&M>,
    ) -> Result<M, ClosureTableError> {
        let id = node.id();
        if let Some(target) = target {
            let target_id = target.id();
            if target.node_kind().is_link() {
                return Err(ClosureTableError::ChainedLinkNotAllowed(target_id.to_string()));
            }
            let stored = self
                .inner
                .find(conn, &target_id)
                .await?
                .ok_or_else(|| ClosureTableError::TargetNotPersisted(target_id.to_string()))?;
            if stored.node_kind().is_link() {
                return Err(ClosureTableError::ChainedLinkNotAllowed(target_id.to_string()));
            }
            if target_id == id {
                return Err(ClosureTableError::SelfLink(id.to_string()));
            }
            if self.is_referenced(conn, node).await? {
                return Err(ClosureTableError::ChainedLinkNotAllowed(id.to_string()));
            }
        }
        if self.inner.has_child_id(conn, &id).await? {
            return Err(ClosureTableError::LinkNodeHasChildren(id.to_string()));
        }

        let stored = self
            .inner
            .find(conn, &id)
            .await?
            .ok_or_else(|| ClosureTableError::NotFound(id.to_string()))?;
        let mut active = stored.into_active_model();
        M::set_node_kind(&mut active, NodeKind::linked_to(target.map(M::id)));
        self.inner.update_on(conn, active).await
    }

    /// Nodes whose link target is `target`.
    pub async fn find_link_to<C: ConnectionTrait>(
        &self,
        conn: &C,
        target: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let models = M::Entity::find()
            .filter(M::link_target_column().eq(M::id_to_value(&target.id())))
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;
        Ok(models)
    }

    /// Link nodes without a target.
    pub async fn find_dead_links<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<M>, ClosureTableError> {
        let models = M::Entity::find()
            .filter(M::link_flag_column().eq(true))
            .filter(M::link_target_column().is_null())
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;
        Ok(models)
    }

    /// Nodes that carry a link target.
    pub async fn find_linking<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<M>, ClosureTableError> {
        let models = M::Entity::find()
            .filter(M::link_target_column().is_not_null())
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;
        Ok(models)
    }

    /// Nodes that are the target of at least one link, in order of first
    /// reference.
    pub async fn find_linked<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<M>, ClosureTableError> {
        let mut seen = HashSet::new();
        let targets = self
            .find_linking(conn)
            .await?
            .iter()
            .filter_map(|node| node.node_kind().target().cloned())
            .filter(|target| seen.insert(target.clone()))
            .collect::<Vec<_>>();
        self.inner.nodes_in_order(conn, targets).await
    }

    pub async fn is_referenced<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        let count = M::Entity::find()
            .filter(M::link_target_column().eq(M::id_to_value(&node.id())))
            .count(conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn delete_path<C>(&self, conn: &C, node: &M) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.delete_path_with(conn, node, false).await
    }

    pub async fn force_delete_path<C>(&self, conn: &C, node: &M) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.delete_path_with(conn, node, true).await
    }

    async fn delete_path_with<C>(
        &self,
        conn: &C,
        node: &M,
        force: bool,
    ) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.inner.begin(conn).await?;
        let result = async {
            self.ensure_unreferenced(guard.connection(), node, force)
                .await?;
            self.inner
                .delete_path_on(guard.connection(), node, force)
                .await
        }
        .await;
        let (paths, removed) = guard.finish(result).await?;
        self.inner.after_delete(node, paths, removed, force);
        Ok(())
    }

    pub async fn remove_node<C>(&self, conn: &C, node: &M) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.remove_node_with(conn, node, false).await
    }

    pub async fn force_remove_node<C>(&self, conn: &C, node: &M) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.remove_node_with(conn, node, true).await
    }

    async fn remove_node_with<C>(
        &self,
        conn: &C,
        node: &M,
        force: bool,
    ) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.inner.begin(conn).await?;
        let result = async {
            self.ensure_unreferenced(guard.connection(), node, force)
                .await?;
            self.inner
                .remove_node_on(guard.connection(), node, force)
                .await
        }
        .await;
        let removed = guard.finish(result).await?;
        if removed {
            self.inner.emit(TreeEvent::NodeRemoved {
                node: node.id(),
                forced: force,
            });
        }
        Ok(removed)
    }

    /// A row about to be deleted must not be the target of any link.
    async fn ensure_unreferenced<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
        force: bool,
    ) -> Result<(), ClosureTableError> {
        let deletes_row = force || self.inner.config().removal_policy().removes_nodes();
        if deletes_row && self.is_referenced(conn, node).await? {
            return Err(ClosureTableError::LinkedNodeStillReferenced(
                node.id().to_string(),
            ));
        }
        Ok(())
    }
}
