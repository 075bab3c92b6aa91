//! Closure-table tree engine for SeaORM.
//!
//! Trees are stored as a node table plus a path table holding one row for
//! every (ancestor, descendant) pair, including each node's self-path. All
//! hierarchy queries are single selects over the path table; mutations keep
//! it closed under the transitive relation.
//!
//! PostgreSQL and SQLite are supported. On PostgreSQL each mutation can
//! additionally take an advisory lock (see [`AdvisoryLockStrategy`]).

pub mod config;
pub mod error;
pub mod linkable;
pub mod lock;
pub mod model;
pub mod nested;
pub mod observer;
pub mod outline;
mod planner;
pub mod repository;
pub mod traits;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{
        AdvisoryLockStrategy, ClosureTableConfig, ClosureTableOptions, RemovalPolicy,
        SiblingOrdering,
    };
    pub use crate::linkable::LinkableRepository;
    pub use crate::model::{NameMatch, NodeKind, TreePath};
    pub use crate::repository::{ClosureTableRepository, Reparented};
    pub use crate::traits::{ClosureTableModel, LinkableModel};
}

pub use closure_table_macros::ClosureTableModel as ClosureTableModelDerive;
#[doc(hidden)]
pub use closure_table_macros::ClosureTableModel;
pub use config::{
    AdvisoryLockKey, AdvisoryLockStrategy, ClosureTableConfig, ClosureTableOptions,
    RemovalPolicy, SiblingOrdering,
};
pub use error::{ClosureTableError, Result};
pub use linkable::LinkableRepository;
pub use model::{NameMatch, NodeKind, PathCore, TreePath};
pub use nested::NestedNode;
pub use observer::{TreeEvent, TreeObserver};
pub use outline::NodeInfo;
pub use repository::{ClosureTableRepository, Reparented};
pub use traits::{ClosureTableModel, LinkableModel};

#[doc(hidden)]
pub mod __private {
    pub use chrono;
    pub use once_cell::sync::Lazy;
}
