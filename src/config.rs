use crc32fast::Hasher;

/// Static configuration describing how a SeaORM model is stored as a
/// closure table.
#[derive(Clone, Debug)]
pub struct ClosureTableConfig {
    entity_name: String,
    path_name: String,
    path_table: String,
    removal_policy: RemovalPolicy,
    sibling_ordering: SiblingOrdering,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl ClosureTableConfig {
    /// Create a new configuration using the logical entity and path names.
    pub fn new(entity_name: impl Into<String>, path_name: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        let path_name = path_name.into();

        let default_lock = AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(
            &entity_name,
            &path_name,
        ));

        Self {
            entity_name,
            path_name,
            path_table: String::new(),
            removal_policy: RemovalPolicy::default(),
            sibling_ordering: SiblingOrdering::default(),
            advisory_lock_strategy: default_lock,
        }
    }

    /// Merge options produced by [`ClosureTableOptions`].
    pub(crate) fn apply_options(mut self, options: ClosureTableOptions) -> Self {
        if let Some(path_table) = options.path_table {
            self.path_table = path_table;
        }
        if let Some(policy) = options.removal_policy {
            self.removal_policy = policy;
        }
        if let Some(ordering) = options.sibling_ordering {
            self.sibling_ordering = ordering;
        }
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        }
        self
    }

    /// Human-readable Rust struct name for the node entity.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Name of the SeaORM entity holding the paths.
    pub fn path_name(&self) -> &str {
        &self.path_name
    }

    /// Table backing the path entity.
    pub fn path_table(&self) -> &str {
        &self.path_table
    }

    /// Whether node rows are physically deleted once their paths are gone.
    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    /// How colliding sibling order indices are handled.
    pub fn sibling_ordering(&self) -> SiblingOrdering {
        self.sibling_ordering
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

/// Builder-style options consumed by the derive macro and by
/// [`ClosureTableRepository::with_options`](crate::ClosureTableRepository::with_options).
#[derive(Clone, Debug, Default)]
pub struct ClosureTableOptions {
    path_table: Option<String>,
    removal_policy: Option<RemovalPolicy>,
    sibling_ordering: Option<SiblingOrdering>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl ClosureTableOptions {
    pub fn path_table(mut self, value: impl Into<String>) -> Self {
        self.path_table = Some(value.into());
        self
    }

    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    pub fn sibling_ordering(mut self, ordering: SiblingOrdering) -> Self {
        self.sibling_ordering = Some(ordering);
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn apply(self, base: ClosureTableConfig) -> ClosureTableConfig {
        base.apply_options(self)
    }
}

/// What happens to a node row once all of its paths were deleted.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RemovalPolicy {
    /// Keep the row; only a forced removal deletes it.
    #[default]
    Retain,
    /// Delete the row together with its last path.
    Remove,
}

impl RemovalPolicy {
    pub fn removes_nodes(self) -> bool {
        matches!(self, RemovalPolicy::Remove)
    }
}

/// Handling of sibling order indices that collide.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SiblingOrdering {
    /// Equal indices are allowed; ties are broken by node id.
    #[default]
    Stable,
    /// Placing a node onto an occupied index shifts that sibling and every
    /// later one up by one.
    Shift,
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(entity: &str, path: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(entity.as_bytes());
        hasher.update(b"/");
        hasher.update(path.as_bytes());
        let crc = hasher.finalize();
        Self(format!("closure-table::{entity}::{path}::{crc:x}"))
    }
}

/// Configuration describing how to acquire advisory locks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_lock_key_is_namespaced_and_stable() {
        let first = ClosureTableConfig::new("Category", "CategoryPath");
        let second = ClosureTableConfig::new("Category", "CategoryPath");
        let key = first.advisory_lock_strategy().key().expect("namespaced by default");

        assert!(key.as_str().starts_with("closure-table::Category::CategoryPath::"));
        assert_eq!(first.advisory_lock_strategy(), second.advisory_lock_strategy());
    }

    #[test]
    fn different_entities_get_different_keys() {
        let a = ClosureTableConfig::new("Category", "CategoryPath");
        let b = ClosureTableConfig::new("MenuItem", "MenuItemPath");
        assert_ne!(a.advisory_lock_strategy(), b.advisory_lock_strategy());
    }

    #[test]
    fn options_override_defaults() {
        let config = ClosureTableOptions::default()
            .path_table("category_paths")
            .removal_policy(RemovalPolicy::Remove)
            .sibling_ordering(SiblingOrdering::Shift)
            .advisory_lock_strategy(AdvisoryLockStrategy::Disabled)
            .apply(ClosureTableConfig::new("Category", "CategoryPath"));

        assert_eq!(config.path_table(), "category_paths");
        assert!(config.removal_policy().removes_nodes());
        assert_eq!(config.sibling_ordering(), SiblingOrdering::Shift);
        assert!(config.advisory_lock_strategy().key().is_none());
    }

    #[test]
    fn untouched_options_keep_base_values() {
        let config = ClosureTableOptions::default().apply(ClosureTableConfig::new("A", "APath"));
        assert_eq!(config.removal_policy(), RemovalPolicy::Retain);
        assert_eq!(config.sibling_ordering(), SiblingOrdering::Stable);
        assert_eq!(config.path_table(), "");
    }
}
