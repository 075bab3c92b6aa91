use thiserror::Error;

/// Errors returned by the closure-table APIs.
///
/// Everything except [`ClosureTableError::Database`] is a precondition
/// violation: it is deterministic for the current tree state and retrying
/// will not help.
#[derive(Debug, Error)]
pub enum ClosureTableError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("node has no identity yet")]
    NotPersisted,

    #[error("node {0} does not exist")]
    NotFound(String),

    #[error("node {0} is not part of a tree")]
    NotInTree(String),

    #[error("node {0} is already part of a tree")]
    AlreadyInTree(String),

    #[error("node {0} still has paths; delete its paths first")]
    StillInTree(String),

    #[error("node {0} is already persistent")]
    AlreadyPersistent(String),

    #[error("node {0} has child(ren)")]
    HasChildren(String),

    #[error("{0} must not be null")]
    NullOperand(&'static str),

    #[error("parent {0} must be persistent and part of a tree")]
    ParentNotPersisted(String),

    #[error("destination {0} must be persistent and part of a tree")]
    DestinationNotPersisted(String),

    #[error("source and destination are the same node")]
    SameNode,

    #[error("node {0} is already a root")]
    AlreadyRoot(String),

    #[error("destination {destination} lies inside the subtree of {subtree}")]
    CyclicMove { subtree: String, destination: String },

    #[error("link node {0} cannot have children")]
    LinkCannotHaveChildren(String),

    #[error("linking to another link ({0}) is not allowed")]
    ChainedLinkNotAllowed(String),

    #[error("link target {0} must be persistent")]
    TargetNotPersisted(String),

    #[error("node {0} cannot link to itself")]
    SelfLink(String),

    #[error("node {0} has children and cannot become a link")]
    LinkNodeHasChildren(String),

    #[error("node {0} is still the link target of other nodes")]
    LinkedNodeStillReferenced(String),

    #[error("path cannot be empty")]
    EmptyPath,

    #[error("level must be at least 1, got {0}")]
    InvalidLevel(u64),

    #[error("closure-table invariant violation: {0}")]
    Invariant(String),
}

impl ClosureTableError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }

    /// `true` for store failures, `false` for precondition violations.
    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

pub type Result<T, E = ClosureTableError> = std::result::Result<T, E>;
