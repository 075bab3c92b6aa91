use std::fmt;
use std::hash::Hash;

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, EntityTrait, FromQueryResult, IntoActiveModel,
    TryGetable, Value,
};

use crate::config::ClosureTableConfig;
use crate::error::ClosureTableError;
use crate::model::{NodeKind, PathCore, TreePath};

/// Trait implemented by SeaORM `Model` types stored as closure-table nodes.
///
/// Implementations are normally provided by the `#[derive(ClosureTableModel)]` macro.
pub trait ClosureTableModel:
    Clone + Send + Sync + 'static + IntoActiveModel<Self::ActiveModel> + FromQueryResult
{
    type Entity: EntityTrait<Model = Self>;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send;
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + TryGetable + Send + Sync + 'static;

    type PathEntity: EntityTrait<Model = Self::PathModel>;
    type PathModel: Clone
        + Send
        + Sync
        + 'static
        + FromQueryResult
        + IntoActiveModel<Self::PathActiveModel>;
    type PathActiveModel: ActiveModelTrait<Entity = Self::PathEntity> + ActiveModelBehavior + Send;

    fn closure_table_config() -> &'static ClosureTableConfig;

    fn id(&self) -> Self::Id;
    /// Identity of an active model, `None` until the row has been inserted.
    fn active_id(active: &Self::ActiveModel) -> Option<Self::Id>;
    fn id_to_value(id: &Self::Id) -> Value;
    /// Ids that stand for "no node" (the type's default, e.g. `0`).
    fn is_null_id(id: &Self::Id) -> bool;

    fn name(&self) -> &str;
    fn set_name(active: &mut Self::ActiveModel, name: &str);

    /// Normal unless the model is linkable.
    fn node_kind(&self) -> NodeKind<Self::Id> {
        NodeKind::Normal
    }

    /// Refresh timestamp columns before the engine writes a node row.
    fn stamp(_active: &mut Self::ActiveModel, _inserting: bool) {}

    fn id_column() -> <Self::Entity as EntityTrait>::Column;
    fn name_column() -> <Self::Entity as EntityTrait>::Column;

    fn path_ancestor_column() -> <Self::PathEntity as EntityTrait>::Column;
    fn path_descendant_column() -> <Self::PathEntity as EntityTrait>::Column;
    fn path_depth_column() -> <Self::PathEntity as EntityTrait>::Column;
    fn path_order_index_column() -> <Self::PathEntity as EntityTrait>::Column;

    fn path_model_ancestor(model: &Self::PathModel) -> Self::Id;
    fn path_model_descendant(model: &Self::PathModel) -> Self::Id;
    fn path_model_depth(model: &Self::PathModel) -> i32;
    fn path_model_order_index(model: &Self::PathModel) -> i32;
    fn path_build_row(
        ancestor: Self::Id,
        descendant: Self::Id,
        core: PathCore,
    ) -> Self::PathActiveModel;

    /// Convert a stored path row into a [`TreePath`].
    fn path_from_model(model: &Self::PathModel) -> Result<TreePath<Self::Id>, ClosureTableError> {
        let depth = Self::path_model_depth(model);
        let depth = u32::try_from(depth).map_err(|_| {
            ClosureTableError::invariant(format!(
                "negative depth {depth} on path {} -> {}",
                Self::path_model_ancestor(model),
                Self::path_model_descendant(model)
            ))
        })?;
        Ok(TreePath::new(
            Self::path_model_ancestor(model),
            Self::path_model_descendant(model),
            depth,
            Self::path_model_order_index(model),
        ))
    }
}

/// Closure-table models whose nodes may alias another node.
///
/// Generated by `#[closure_table(linkable)]`.
pub trait LinkableModel: ClosureTableModel {
    fn link_flag_column() -> <Self::Entity as EntityTrait>::Column;
    fn link_target_column() -> <Self::Entity as EntityTrait>::Column;
    fn set_node_kind(active: &mut Self::ActiveModel, kind: NodeKind<Self::Id>);
}
