use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    TransactionTrait,
};
use tracing::{debug, info, warn};

use super::ClosureTableRepository;
use crate::config::SiblingOrdering;
use crate::error::ClosureTableError;
use crate::model::TreePath;
use crate::observer::TreeEvent;
use crate::planner::{plan_move, MovePlan};
use crate::traits::ClosureTableModel;

/// Which branch [`ClosureTableRepository::reparent`] took.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reparented {
    /// The node had no paths and was attached.
    Attached,
    /// The node's subtree was moved to the new parent.
    Moved,
    /// The parent was unchanged; only the order index was rewritten.
    Reordered,
}

impl<M> ClosureTableRepository<M>
where
    M: ClosureTableModel,
{
    /// Persist a detached node. Fails if it already has an identity.
    pub async fn insert<C>(&self, conn: &C, node: M::ActiveModel) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.insert_on(guard.connection(), node).await;
        let model = guard.finish(result).await?;

        info!(node = %model.id(), "inserted node");
        self.emit(TreeEvent::NodeInserted { node: model.id() });
        Ok(model)
    }

    /// Persist field changes of an existing node. Paths are left untouched.
    pub async fn update<C>(&self, conn: &C, node: M::ActiveModel) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.update_on(guard.connection(), node).await;
        let model = guard.finish(result).await?;

        info!(node = %model.id(), "updated node");
        self.emit(TreeEvent::NodeUpdated { node: model.id() });
        Ok(model)
    }

    pub async fn insert_or_update<C>(
        &self,
        conn: &C,
        node: M::ActiveModel,
    ) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if Self::is_persistent(&node) {
            self.update(conn, node).await
        } else {
            self.insert(conn, node).await
        }
    }

    /// Attach `node` as a new root.
    pub async fn create_root<C>(&self, conn: &C, node: M::ActiveModel) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.add_child(conn, None, node).await
    }

    pub async fn add_child<C>(
        &self,
        conn: &C,
        parent: Option<&M>,
        child: M::ActiveModel,
    ) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.add_child_at(conn, parent, child, 0).await
    }

    /// Attach `child` below `parent` (or as a root) at `order_index`.
    ///
    /// A child without identity is inserted first; one with unsaved changes
    /// is updated.
    pub async fn add_child_at<C>(
        &self,
        conn: &C,
        parent: Option<&M>,
        child: M::ActiveModel,
        order_index: i32,
    ) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .add_child_on(guard.connection(), parent, child, order_index)
            .await;
        let (child, paths) = guard.finish(result).await?;

        let parent_id = parent.map(M::id);
        info!(child = %child.id(), parent = ?parent_id, order_index, paths, "added child");
        self.emit(TreeEvent::ChildAdded {
            parent: parent_id,
            child: child.id(),
            order_index,
            paths,
        });
        Ok(child)
    }

    pub async fn move_to<C>(
        &self,
        conn: &C,
        subtree_root: &M,
        destination: Option<&M>,
    ) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.move_to_at(conn, subtree_root, destination, 0).await
    }

    /// Relocate the subtree rooted at `subtree_root` below `destination`, or to
    /// root level when `destination` is `None`.
    ///
    /// Order indices below the moved root are preserved; the root takes
    /// `order_index`.
    pub async fn move_to_at<C>(
        &self,
        conn: &C,
        subtree_root: &M,
        destination: Option<&M>,
        order_index: i32,
    ) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .move_to_on(guard.connection(), subtree_root, destination, order_index)
            .await;
        let plan = guard.finish(result).await?;

        let destination_id = destination.map(M::id);
        info!(
            root = %subtree_root.id(),
            destination = ?destination_id,
            nodes = plan.moved_nodes(),
            paths = plan.paths.len(),
            "moved subtree"
        );
        self.emit(TreeEvent::SubtreeMoved {
            root: subtree_root.id(),
            destination: destination_id,
            order_index,
            nodes: plan.moved_nodes(),
            paths: plan.paths.len(),
        });
        Ok(())
    }

    /// Place the node `source_id` below `parent_id` (root when `None` or a
    /// null id), attaching, moving or reordering as needed.
    pub async fn reparent<C>(
        &self,
        conn: &C,
        source_id: &M::Id,
        parent_id: Option<&M::Id>,
        order_index: i32,
    ) -> Result<Reparented, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .reparent_on(guard.connection(), source_id, parent_id, order_index)
            .await;
        let (outcome, event) = guard.finish(result).await?;

        info!(node = %source_id, ?outcome, order_index, "reparented node");
        self.emit(event);
        Ok(outcome)
    }

    /// Remove all paths of a leaf node, then its row when the removal policy
    /// allows it.
    pub async fn delete_path<C>(&self, conn: &C, node: &M) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.delete_path_with(conn, node, false).await
    }

    /// Like [`delete_path`](Self::delete_path) but always deletes the row.
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
        let guard = self.begin(conn).await?;
        let result = self.delete_path_on(guard.connection(), node, force).await;
        let (paths, removed) = guard.finish(result).await?;
        self.after_delete(node, paths, removed, force);
        Ok(())
    }

    /// Delete the row of a node that is no longer in a tree, if the removal
    /// policy allows it. Returns whether the row was deleted.
    pub async fn remove_node<C>(&self, conn: &C, node: &M) -> Result<bool, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.remove_node_with(conn, node, false).await
    }

    /// Delete the row of a node that is no longer in a tree, regardless of the
    /// removal policy.
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
        let guard = self.begin(conn).await?;
        let result = self.remove_node_on(guard.connection(), node, force).await;
        let removed = guard.finish(result).await?;
        if removed {
            self.emit(TreeEvent::NodeRemoved {
                node: node.id(),
                forced: force,
            });
        }
        Ok(removed)
    }

    /// Walk `segments` from the roots down, creating every missing node.
    pub async fn find_or_create_by_path<C, S>(
        &self,
        conn: &C,
        segments: &[S],
    ) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
        S: AsRef<str>,
    {
        if segments.is_empty() {
            return Err(ClosureTableError::EmptyPath);
        }

        let guard = self.begin(conn).await?;
        let result = self
            .find_or_create_by_path_on(guard.connection(), segments)
            .await;
        let (model, created) = guard.finish(result).await?;

        for (parent, child, paths) in created {
            info!(%child, parent = ?parent, "created path segment");
            self.emit(TreeEvent::ChildAdded {
                parent,
                child,
                order_index: 0,
                paths,
            });
        }
        Ok(model)
    }

    pub(crate) fn after_delete(&self, node: &M, paths: usize, removed: bool, forced: bool) {
        info!(node = %node.id(), paths, removed, "deleted paths");
        self.emit(TreeEvent::PathDeleted {
            node: node.id(),
            paths,
        });
        if removed {
            self.emit(TreeEvent::NodeRemoved {
                node: node.id(),
                forced,
            });
        }
    }

    pub(crate) async fn insert_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        mut node: M::ActiveModel,
    ) -> Result<M, ClosureTableError> {
        if let Some(id) = M::active_id(&node) {
            return Err(ClosureTableError::AlreadyPersistent(id.to_string()));
        }
        M::stamp(&mut node, true);
        let model = node.insert(conn).await?;
        Ok(model)
    }

    pub(crate) async fn update_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        mut node: M::ActiveModel,
    ) -> Result<M, ClosureTableError> {
        if M::active_id(&node).is_none() {
            return Err(ClosureTableError::NotPersisted);
        }
        M::stamp(&mut node, false);
        let model = node.update(conn).await?;
        Ok(model)
    }

    /// Resolve an active model to a stored row, inserting or updating it.
    async fn persist_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: M::ActiveModel,
    ) -> Result<M, ClosureTableError> {
        match M::active_id(&node) {
            None => self.insert_on(conn, node).await,
            Some(_) if node.is_changed() => self.update_on(conn, node).await,
            Some(id) => self
                .find(conn, &id)
                .await?
                .ok_or_else(|| ClosureTableError::NotFound(id.to_string())),
        }
    }

    /// Checks the stored row, not the caller's copy, which may predate a
    /// `set_link`. A missing row is left to the persistence checks.
    async fn ensure_can_parent<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: Option<&M>,
    ) -> Result<(), ClosureTableError> {
        let Some(parent) = parent else {
            return Ok(());
        };
        let id = parent.id();
        match self.find(conn, &id).await? {
            Some(stored) if stored.node_kind().is_link() => {
                Err(ClosureTableError::LinkCannotHaveChildren(id.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn add_child_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: Option<&M>,
        child: M::ActiveModel,
        order_index: i32,
    ) -> Result<(M, usize), ClosureTableError> {
        let child = self.persist_on(conn, child).await?;
        let paths = self.attach_on(conn, parent, &child, order_index).await?;
        Ok((child, paths))
    }

    /// Insert the paths placing an existing, detached node below `parent`.
    async fn attach_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: Option<&M>,
        child: &M,
        order_index: i32,
    ) -> Result<usize, ClosureTableError> {
        self.ensure_can_parent(conn, parent).await?;
        let child_id = child.id();
        if self.count_descendant_paths(conn, &child_id).await? > 0 {
            return Err(ClosureTableError::AlreadyInTree(child_id.to_string()));
        }

        let mut rows = Vec::new();
        let parent_id = parent.map(M::id);
        if let Some(parent_id) = &parent_id {
            let parent_paths = self.descendant_paths_of(conn, parent_id).await?;
            if parent_paths.is_empty() {
                return Err(ClosureTableError::ParentNotPersisted(parent_id.to_string()));
            }
            for path in parent_paths {
                rows.push(TreePath::new(
                    path.ancestor,
                    child_id.clone(),
                    path.core.depth + 1,
                    order_index,
                ));
            }
        }

        self.make_room(conn, parent_id.as_ref(), order_index, &child_id)
            .await?;
        rows.push(TreePath::self_reference(child_id, order_index));
        let count = rows.len();
        self.insert_paths(conn, rows).await?;
        Ok(count)
    }

    pub(crate) async fn move_to_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        subtree_root: &M,
        destination: Option<&M>,
        order_index: i32,
    ) -> Result<MovePlan<M::Id>, ClosureTableError> {
        let root_id = subtree_root.id();
        if self.count_descendant_paths(conn, &root_id).await? == 0 {
            return Err(ClosureTableError::ParentNotPersisted(root_id.to_string()));
        }
        let destination_id = destination.map(M::id);
        if let Some(destination_id) = &destination_id {
            if self.count_descendant_paths(conn, destination_id).await? == 0 {
                return Err(ClosureTableError::DestinationNotPersisted(
                    destination_id.to_string(),
                ));
            }
            if *destination_id == root_id {
                return Err(ClosureTableError::SameNode);
            }
        } else if self.is_root_id(conn, &root_id).await? {
            return Err(ClosureTableError::AlreadyRoot(root_id.to_string()));
        }
        self.ensure_can_parent(conn, destination).await?;

        let members = self.tree_ids(conn, &root_id).await?;
        if let Some(destination_id) = &destination_id {
            if members.contains(destination_id) {
                return Err(ClosureTableError::CyclicMove {
                    subtree: root_id.to_string(),
                    destination: destination_id.to_string(),
                });
            }
        }

        let destination_chain = match &destination_id {
            Some(destination_id) => self.path_ids(conn, destination_id).await?,
            None => Vec::new(),
        };
        let ancestry = self.ancestry_of(conn, &members).await?;
        let plan = plan_move(
            &root_id,
            order_index,
            &members,
            &ancestry,
            &destination_chain,
        )?;
        debug!(
            root = %root_id,
            nodes = plan.moved_nodes(),
            paths = plan.paths.len(),
            "planned move"
        );

        self.make_room(conn, destination_id.as_ref(), order_index, &root_id)
            .await?;
        for member in &plan.detach_order {
            self.delete_descendant_paths(conn, member).await?;
        }
        self.insert_paths(conn, plan.paths.clone()).await?;
        Ok(plan)
    }

    async fn reparent_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        source_id: &M::Id,
        parent_id: Option<&M::Id>,
        order_index: i32,
    ) -> Result<(Reparented, TreeEvent<M::Id>), ClosureTableError> {
        if M::is_null_id(source_id) {
            return Err(ClosureTableError::NullOperand("source"));
        }
        let source = self
            .find(conn, source_id)
            .await?
            .ok_or_else(|| ClosureTableError::NotFound(source_id.to_string()))?;

        let new_parent = match parent_id.filter(|id| !M::is_null_id(id)) {
            Some(id) => Some(
                self.find(conn, id)
                    .await?
                    .ok_or_else(|| ClosureTableError::NotFound(id.to_string()))?,
            ),
            None => None,
        };
        let new_parent_id = new_parent.as_ref().map(M::id);

        if self.count_descendant_paths(conn, source_id).await? == 0 {
            let paths = self
                .attach_on(conn, new_parent.as_ref(), &source, order_index)
                .await?;
            let event = TreeEvent::ChildAdded {
                parent: new_parent_id,
                child: source_id.clone(),
                order_index,
                paths,
            };
            return Ok((Reparented::Attached, event));
        }

        let current_parent = self.parent_id(conn, source_id).await?;
        if current_parent == new_parent_id {
            self.make_room(conn, current_parent.as_ref(), order_index, source_id)
                .await?;
            self.set_order_index(conn, source_id, order_index).await?;
            let event = TreeEvent::OrderChanged {
                node: source_id.clone(),
                order_index,
            };
            return Ok((Reparented::Reordered, event));
        }

        let plan = self
            .move_to_on(conn, &source, new_parent.as_ref(), order_index)
            .await?;
        let event = TreeEvent::SubtreeMoved {
            root: source_id.clone(),
            destination: new_parent_id,
            order_index,
            nodes: plan.moved_nodes(),
            paths: plan.paths.len(),
        };
        Ok((Reparented::Moved, event))
    }

    pub(crate) async fn delete_path_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
        force: bool,
    ) -> Result<(usize, bool), ClosureTableError> {
        let id = node.id();
        if self.has_child_id(conn, &id).await? {
            return Err(ClosureTableError::HasChildren(id.to_string()));
        }
        let paths = self.delete_descendant_paths(conn, &id).await?;
        let removed = self.remove_node_on(conn, node, force).await?;
        Ok((paths, removed))
    }

    pub(crate) async fn remove_node_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
        force: bool,
    ) -> Result<bool, ClosureTableError> {
        if !(self.config.removal_policy().removes_nodes() || force) {
            return Ok(false);
        }
        let id = node.id();
        if self.count_descendant_paths(conn, &id).await? > 0 {
            return Err(ClosureTableError::StillInTree(id.to_string()));
        }
        if force {
            warn!(node = %id, "force removing node");
        }
        M::Entity::delete_many()
            .filter(M::id_column().eq(M::id_to_value(&id)))
            .exec(conn)
            .await?;
        Ok(true)
    }

    async fn find_or_create_by_path_on<C: ConnectionTrait, S: AsRef<str>>(
        &self,
        conn: &C,
        segments: &[S],
    ) -> Result<(M, Vec<(Option<M::Id>, M::Id, usize)>), ClosureTableError> {
        let mut current: Option<M> = None;
        let mut created = Vec::new();

        for segment in segments {
            let name = segment.as_ref();
            let parent_id = current.as_ref().map(M::id);
            match self
                .find_child_by_name(conn, parent_id.as_ref(), name)
                .await?
            {
                Some(model) => current = Some(model),
                None => {
                    let mut active = <M::ActiveModel as ActiveModelBehavior>::new();
                    M::set_name(&mut active, name);
                    let child = self.insert_on(conn, active).await?;
                    let paths = self.attach_on(conn, current.as_ref(), &child, 0).await?;
                    created.push((parent_id, child.id(), paths));
                    current = Some(child);
                }
            }
        }

        let model =
            current.ok_or_else(|| ClosureTableError::invariant("path segments produced no model"))?;
        Ok((model, created))
    }

    /// Under [`SiblingOrdering::Shift`], free `order_index` among the children
    /// of `parent` (the roots when `None`) by moving the occupant and every
    /// later sibling up by one. `placing` is ignored as a sibling.
    async fn make_room<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: Option<&M::Id>,
        order_index: i32,
        placing: &M::Id,
    ) -> Result<(), ClosureTableError> {
        if self.config.sibling_ordering() != SiblingOrdering::Shift {
            return Ok(());
        }

        let siblings = match parent {
            Some(parent) => self.child_paths(conn, parent).await?,
            None => {
                let roots = self.root_ids(conn).await?;
                self.self_paths_of(conn, &roots).await?
            }
        };
        let siblings: Vec<&TreePath<M::Id>> = siblings
            .iter()
            .filter(|path| path.descendant != *placing)
            .collect();
        if !siblings
            .iter()
            .any(|path| path.order_index() == order_index)
        {
            return Ok(());
        }

        let shifted = siblings
            .iter()
            .filter(|path| path.order_index() >= order_index)
            .map(|path| M::id_to_value(&path.descendant))
            .collect::<Vec<_>>();
        let order_column = M::path_order_index_column();
        M::PathEntity::update_many()
            .col_expr(
                order_column,
                Expr::col(order_column.as_column_ref()).add(1),
            )
            .filter(M::path_descendant_column().is_in(shifted))
            .exec(conn)
            .await?;
        debug!(order_index, parent = ?parent, "shifted colliding siblings");
        Ok(())
    }

    /// Rewrite the order index on every descendant-path of `id`, keeping the
    /// self-path and the depth-1 copy equal.
    async fn set_order_index<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        order_index: i32,
    ) -> Result<(), ClosureTableError> {
        M::PathEntity::update_many()
            .col_expr(M::path_order_index_column(), Expr::value(order_index))
            .filter(M::path_descendant_column().eq(M::id_to_value(id)))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn delete_descendant_paths<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<usize, ClosureTableError> {
        let result = M::PathEntity::delete_many()
            .filter(M::path_descendant_column().eq(M::id_to_value(id)))
            .exec(conn)
            .await?;
        Ok(result.rows_affected as usize)
    }

    async fn insert_paths<C: ConnectionTrait>(
        &self,
        conn: &C,
        paths: Vec<TreePath<M::Id>>,
    ) -> Result<(), ClosureTableError> {
        if paths.is_empty() {
            return Ok(());
        }
        let rows = paths
            .into_iter()
            .map(|path| M::path_build_row(path.ancestor, path.descendant, path.core));
        M::PathEntity::insert_many(rows)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }
}
