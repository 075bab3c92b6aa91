use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tracing::debug;

use super::{to_paths, ClosureTableRepository};
use crate::error::ClosureTableError;
use crate::model::{NameMatch, TreePath};
use crate::nested::NestedNode;
use crate::outline::{build_outline, rebase_levels, NodeInfo};
use crate::traits::ClosureTableModel;

type Expansion<'a, M> =
    Pin<Box<dyn Future<Output = Result<NestedNode<M>, ClosureTableError>> + Send + 'a>>;

impl<M> ClosureTableRepository<M>
where
    M: ClosureTableModel,
{
    /// `true` once the node has an identity assigned by the store.
    pub fn is_persistent(node: &M::ActiveModel) -> bool {
        M::active_id(node).is_some()
    }

    pub async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M>, ClosureTableError> {
        let node = M::Entity::find()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .one(conn)
            .await?;
        Ok(node)
    }

    pub async fn find_all<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError> {
        let nodes = M::Entity::find()
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;
        Ok(nodes)
    }

    pub async fn find_all_paths<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<TreePath<M::Id>>, ClosureTableError> {
        let rows = M::PathEntity::find()
            .order_by_asc(M::path_descendant_column())
            .order_by_desc(M::path_depth_column())
            .all(conn)
            .await?;
        to_paths::<M>(rows)
    }

    pub async fn find_by_name<C: ConnectionTrait>(
        &self,
        conn: &C,
        text: &str,
        mode: NameMatch,
    ) -> Result<Vec<M>, ClosureTableError> {
        let column = M::name_column();
        let condition = match mode {
            NameMatch::Exact => column.eq(text),
            NameMatch::Prefix => column.starts_with(text),
            NameMatch::Suffix => column.ends_with(text),
            NameMatch::Contains => column.contains(text),
        };
        let nodes = M::Entity::find()
            .filter(condition)
            .order_by_asc(M::id_column())
            .all(conn)
            .await?;
        Ok(nodes)
    }

    /// `true` when the node has its self-path, i.e. belongs to a tree.
    pub async fn is_path_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        Ok(self.count_descendant_paths(conn, &node.id()).await? > 0)
    }

    pub async fn is_root<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        self.is_root_id(conn, &node.id()).await
    }

    pub async fn has_child<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        self.has_child_id(conn, &node.id()).await
    }

    /// Number of nodes on the path from the root to `node`; roots are level 1.
    pub async fn level<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, ClosureTableError> {
        let id = node.id();
        match self.count_descendant_paths(conn, &id).await? {
            0 => Err(ClosureTableError::NotInTree(id.to_string())),
            level => Ok(level),
        }
    }

    pub async fn parent<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Option<M>, ClosureTableError> {
        let id = node.id();
        self.ensure_in_tree(conn, &id).await?;
        match self.parent_id(conn, &id).await? {
            Some(parent_id) => {
                let parent = self.find(conn, &parent_id).await?.ok_or_else(|| {
                    ClosureTableError::invariant(format!("parent {parent_id} of {id} is missing"))
                })?;
                Ok(Some(parent))
            }
            None => Ok(None),
        }
    }

    /// Direct children ordered by their order index.
    pub async fn children<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let ids = self.child_ids(conn, &parent.id()).await?;
        self.nodes_in_order(conn, ids).await
    }

    pub async fn children_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: &M,
    ) -> Result<u64, ClosureTableError> {
        let count = M::PathEntity::find()
            .filter(M::path_ancestor_column().eq(M::id_to_value(&parent.id())))
            .filter(M::path_depth_column().eq(1))
            .count(conn)
            .await?;
        Ok(count)
    }

    /// `node` and all of its descendants, shallowest first.
    pub async fn tree<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let ids = self.tree_ids(conn, &node.id()).await?;
        self.nodes_in_order(conn, ids).await
    }

    /// Ancestors of `node`, root first, ending with `node`.
    pub async fn path<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let ids = self.path_ids(conn, &node.id()).await?;
        self.nodes_in_order(conn, ids).await
    }

    /// Paths with `node` as ancestor, shallowest first.
    pub async fn tree_paths<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<TreePath<M::Id>>, ClosureTableError> {
        let rows = M::PathEntity::find()
            .filter(M::path_ancestor_column().eq(M::id_to_value(&node.id())))
            .order_by_asc(M::path_depth_column())
            .order_by_asc(M::path_order_index_column())
            .order_by_asc(M::path_descendant_column())
            .all(conn)
            .await?;
        to_paths::<M>(rows)
    }

    /// Paths with `node` as descendant, root-most ancestor first.
    pub async fn descendant_paths<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<TreePath<M::Id>>, ClosureTableError> {
        self.descendant_paths_of(conn, &node.id()).await
    }

    pub async fn count_paths<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, ClosureTableError> {
        self.count_descendant_paths(conn, &node.id()).await
    }

    /// Children of the node's parent, or the roots when `node` is a root.
    pub async fn siblings<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let id = node.id();
        self.ensure_in_tree(conn, &id).await?;
        let ids = match self.parent_id(conn, &id).await? {
            Some(parent_id) => self.child_ids(conn, &parent_id).await?,
            None => self.root_ids(conn).await?,
        };
        self.nodes_in_order(conn, ids).await
    }

    pub async fn root_nodes<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError> {
        let ids = self.root_ids(conn).await?;
        self.nodes_in_order(conn, ids).await
    }

    pub async fn find_tree_path<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor: &M,
        descendant: &M,
    ) -> Result<Option<TreePath<M::Id>>, ClosureTableError> {
        self.find_tree_path_by_id(conn, &ancestor.id(), &descendant.id())
            .await
    }

    /// Look up the stored row matching the endpoints of `path`.
    pub async fn find_tree_path_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        path: &TreePath<M::Id>,
    ) -> Result<Option<TreePath<M::Id>>, ClosureTableError> {
        self.find_tree_path_by_id(conn, &path.ancestor, &path.descendant)
            .await
    }

    /// `true` when `descendant` lies in the subtree of `ancestor` (or is it).
    pub async fn contains<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor: &M,
        descendant: &M,
    ) -> Result<bool, ClosureTableError> {
        Ok(self.find_tree_path(conn, ancestor, descendant).await?.is_some())
    }

    /// `true` when `ancestor` appears on the path from the root to `node`.
    pub async fn belongs_to<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
        ancestor: &M,
    ) -> Result<bool, ClosureTableError> {
        self.contains(conn, ancestor, node).await
    }

    /// Resolve a root-first sequence of names through the children of each
    /// segment.
    pub async fn find_by_path<C: ConnectionTrait, S: AsRef<str>>(
        &self,
        conn: &C,
        segments: &[S],
    ) -> Result<Option<M>, ClosureTableError> {
        if segments.is_empty() {
            return Ok(None);
        }

        let mut current: Option<M> = None;
        for segment in segments {
            let parent_id = current.as_ref().map(M::id);
            match self
                .find_child_by_name(conn, parent_id.as_ref(), segment.as_ref())
                .await?
            {
                Some(model) => current = Some(model),
                None => return Ok(None),
            }
        }

        Ok(current)
    }

    /// Every node with its ancestor chain, in depth-first order.
    pub async fn outline<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<NodeInfo<M, M::Id>>, ClosureTableError> {
        let paths = self.find_all_paths(conn).await?;
        let nodes = self.find_all(conn).await?;
        let nodes = nodes.into_iter().map(|node| (node.id(), node)).collect();
        build_outline(paths, nodes)
    }

    /// Outline restricted to nodes at `level` or deeper.
    pub async fn outline_from_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        level: u64,
    ) -> Result<Vec<NodeInfo<M, M::Id>>, ClosureTableError> {
        if level < 1 {
            return Err(ClosureTableError::InvalidLevel(level));
        }
        let mut infos = self.outline(conn).await?;
        infos.retain(|info| info.level >= level);
        Ok(infos)
    }

    /// Outline of the subtrees below `roots`, levels re-based so the first
    /// entry sits at level 1.
    pub async fn outline_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        roots: &[M],
    ) -> Result<Vec<NodeInfo<M, M::Id>>, ClosureTableError> {
        let mut members = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            for id in self.tree_ids(conn, &root.id()).await? {
                if seen.insert(id.clone()) {
                    members.push(id);
                }
            }
        }
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let values = members.iter().map(M::id_to_value).collect::<Vec<_>>();
        let rows = M::PathEntity::find()
            .filter(M::path_descendant_column().is_in(values))
            .all(conn)
            .await?;
        let nodes = self.nodes_in_order(conn, members).await?;
        let nodes = nodes.into_iter().map(|node| (node.id(), node)).collect();

        let mut infos = build_outline(to_paths::<M>(rows)?, nodes)?;
        rebase_levels(&mut infos);
        Ok(infos)
    }

    /// Expand `node` and its descendants into a nested structure.
    pub async fn nested_view<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<NestedNode<M>, ClosureTableError> {
        self.expand(conn, node.clone()).await
    }

    /// Nested view of every tree, roots in root order.
    pub async fn nested_forest<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<NestedNode<M>>, ClosureTableError> {
        let roots = self.root_nodes(conn).await?;
        let mut forest = Vec::with_capacity(roots.len());
        for root in roots {
            forest.push(self.expand(conn, root).await?);
        }
        Ok(forest)
    }

    fn expand<'a, C: ConnectionTrait>(&'a self, conn: &'a C, node: M) -> Expansion<'a, M> {
        Box::pin(async move {
            let children = self.children(conn, &node).await?;
            let mut expanded = Vec::with_capacity(children.len());
            for child in children {
                expanded.push(self.expand(conn, child).await?);
            }
            Ok(NestedNode {
                node,
                children: expanded,
            })
        })
    }

    pub(crate) async fn count_descendant_paths<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<u64, ClosureTableError> {
        let count = M::PathEntity::find()
            .filter(M::path_descendant_column().eq(M::id_to_value(id)))
            .count(conn)
            .await?;
        Ok(count)
    }

    pub(crate) async fn ensure_in_tree<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        if self.count_descendant_paths(conn, id).await? == 0 {
            return Err(ClosureTableError::NotInTree(id.to_string()));
        }
        Ok(())
    }

    pub(crate) async fn is_root_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<bool, ClosureTableError> {
        Ok(self.count_descendant_paths(conn, id).await? == 1)
    }

    pub(crate) async fn has_child_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<bool, ClosureTableError> {
        if self.count_descendant_paths(conn, id).await? == 0 {
            return Ok(false);
        }
        let below = M::PathEntity::find()
            .filter(M::path_ancestor_column().eq(M::id_to_value(id)))
            .count(conn)
            .await?;
        Ok(below > 1)
    }

    pub(crate) async fn parent_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M::Id>, ClosureTableError> {
        let row = M::PathEntity::find()
            .filter(M::path_descendant_column().eq(M::id_to_value(id)))
            .filter(M::path_depth_column().eq(1))
            .one(conn)
            .await?;
        Ok(row.as_ref().map(M::path_model_ancestor))
    }

    pub(crate) async fn child_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let rows = M::PathEntity::find()
            .filter(M::path_ancestor_column().eq(M::id_to_value(parent)))
            .filter(M::path_depth_column().eq(1))
            .order_by_asc(M::path_order_index_column())
            .order_by_asc(M::path_descendant_column())
            .all(conn)
            .await?;
        Ok(rows.iter().map(M::path_model_descendant).collect())
    }

    pub(crate) async fn child_paths<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: &M::Id,
    ) -> Result<Vec<TreePath<M::Id>>, ClosureTableError> {
        let rows = M::PathEntity::find()
            .filter(M::path_ancestor_column().eq(M::id_to_value(parent)))
            .filter(M::path_depth_column().eq(1))
            .all(conn)
            .await?;
        to_paths::<M>(rows)
    }

    pub(crate) async fn tree_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let rows = M::PathEntity::find()
            .filter(M::path_ancestor_column().eq(M::id_to_value(id)))
            .order_by_asc(M::path_depth_column())
            .order_by_asc(M::path_order_index_column())
            .order_by_asc(M::path_descendant_column())
            .all(conn)
            .await?;
        Ok(rows.iter().map(M::path_model_descendant).collect())
    }

    pub(crate) async fn path_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let paths = self.descendant_paths_of(conn, id).await?;
        Ok(paths.into_iter().map(|path| path.ancestor).collect())
    }

    pub(crate) async fn descendant_paths_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<TreePath<M::Id>>, ClosureTableError> {
        let rows = M::PathEntity::find()
            .filter(M::path_descendant_column().eq(M::id_to_value(id)))
            .order_by_desc(M::path_depth_column())
            .all(conn)
            .await?;
        to_paths::<M>(rows)
    }

    /// Descendant-paths of several nodes at once, grouped by node.
    pub(crate) async fn ancestry_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[M::Id],
    ) -> Result<HashMap<M::Id, Vec<TreePath<M::Id>>>, ClosureTableError> {
        let mut grouped: HashMap<M::Id, Vec<TreePath<M::Id>>> = HashMap::new();
        if ids.is_empty() {
            return Ok(grouped);
        }
        let values = ids.iter().map(M::id_to_value).collect::<Vec<_>>();
        let rows = M::PathEntity::find()
            .filter(M::path_descendant_column().is_in(values))
            .order_by_desc(M::path_depth_column())
            .all(conn)
            .await?;
        for path in to_paths::<M>(rows)? {
            grouped.entry(path.descendant.clone()).or_default().push(path);
        }
        Ok(grouped)
    }

    /// Nodes whose only descendant-path is their self-path, ordered by the
    /// order index of that self-path.
    pub(crate) async fn root_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let ancestor = Expr::col(M::path_ancestor_column().as_column_ref());
        let ids: Vec<M::Id> = M::PathEntity::find()
            .select_only()
            .column(M::path_descendant_column())
            .group_by(M::path_descendant_column())
            .having(Expr::expr(ancestor.count()).eq(1))
            .into_tuple()
            .all(conn)
            .await?;
        debug!(roots = ids.len(), "resolved root nodes");

        let ordered = self.self_paths_of(conn, &ids).await?;
        Ok(ordered.into_iter().map(|path| path.descendant).collect())
    }

    /// Self-paths of `ids`, ordered by order index then id.
    pub(crate) async fn self_paths_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[M::Id],
    ) -> Result<Vec<TreePath<M::Id>>, ClosureTableError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let values = ids.iter().map(M::id_to_value).collect::<Vec<_>>();
        let rows = M::PathEntity::find()
            .filter(M::path_descendant_column().is_in(values))
            .filter(M::path_depth_column().eq(0))
            .order_by_asc(M::path_order_index_column())
            .order_by_asc(M::path_descendant_column())
            .all(conn)
            .await?;
        to_paths::<M>(rows)
    }

    pub(crate) async fn find_tree_path_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor: &M::Id,
        descendant: &M::Id,
    ) -> Result<Option<TreePath<M::Id>>, ClosureTableError> {
        let row = M::PathEntity::find()
            .filter(M::path_ancestor_column().eq(M::id_to_value(ancestor)))
            .filter(M::path_descendant_column().eq(M::id_to_value(descendant)))
            .one(conn)
            .await?;
        row.as_ref().map(M::path_from_model).transpose()
    }

    pub(crate) async fn find_child_by_name<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<&M::Id>,
        name: &str,
    ) -> Result<Option<M>, ClosureTableError> {
        let candidates = match parent_id {
            Some(parent_id) => self.child_ids(conn, parent_id).await?,
            None => self.root_ids(conn).await?,
        };
        if candidates.is_empty() {
            return Ok(None);
        }

        let values = candidates.iter().map(M::id_to_value).collect::<Vec<_>>();
        let condition = Condition::all()
            .add(M::name_column().eq(name))
            .add(M::id_column().is_in(values));

        let model = M::Entity::find()
            .filter(condition)
            .order_by_asc(M::id_column())
            .one(conn)
            .await?;
        Ok(model)
    }
}
