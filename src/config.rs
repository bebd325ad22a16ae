use crc32fast::Hasher;

/// Static configuration binding a node type to its entity and closure tables.
#[derive(Clone, Debug)]
pub struct ClosureTableConfig {
    entity_class: String,
    entity_table: String,
    closure_class: String,
    closure_table: String,
    namespace: String,
    use_extra_storage_options: bool,
    position_policy: PositionPolicy,
    dependent_behavior: DependentBehavior,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl ClosureTableConfig {
    /// Create a configuration from the entity type name and its table.
    ///
    /// The closure class defaults to `{entity_class}Closure` and the closure
    /// table to `{entity_table}_closure`.
    pub fn new(entity_class: impl Into<String>, entity_table: impl Into<String>) -> Self {
        let entity_class = entity_class.into();
        let entity_table = entity_table.into();
        let closure_class = format!("{entity_class}Closure");
        let closure_table = format!("{entity_table}_closure");

        Self {
            advisory_lock_strategy: AdvisoryLockStrategy::Namespaced(
                AdvisoryLockKey::derived_from(&entity_class, &closure_class),
            ),
            entity_class,
            entity_table,
            closure_class,
            closure_table,
            namespace: String::new(),
            use_extra_storage_options: false,
            position_policy: PositionPolicy::default(),
            dependent_behavior: DependentBehavior::default(),
        }
    }

    /// Merge options produced by [`ClosureTableOptions`].
    pub(crate) fn apply_options(mut self, options: ClosureTableOptions) -> Self {
        let mut rederive_lock = false;
        if let Some(closure_class) = options.closure_class {
            self.closure_class = closure_class;
            rederive_lock = true;
        }
        if let Some(closure_table) = options.closure_table {
            self.closure_table = closure_table;
        }
        if let Some(namespace) = options.namespace {
            self.namespace = namespace;
        }
        if let Some(extra) = options.use_extra_storage_options {
            self.use_extra_storage_options = extra;
        }
        if let Some(policy) = options.position_policy {
            self.position_policy = policy;
        }
        if let Some(behavior) = options.dependent_behavior {
            self.dependent_behavior = behavior;
        }
        match options.advisory_lock_strategy {
            Some(strategy) => self.advisory_lock_strategy = strategy,
            None if rederive_lock => {
                if let AdvisoryLockStrategy::Namespaced(_) = self.advisory_lock_strategy {
                    self.advisory_lock_strategy = AdvisoryLockStrategy::Namespaced(
                        AdvisoryLockKey::derived_from(&self.entity_class, &self.closure_class),
                    );
                }
            }
            None => {}
        }
        self
    }

    /// Rust type name of the node entity.
    pub fn entity_class(&self) -> &str {
        &self.entity_class
    }

    /// Table holding one row per node.
    pub fn entity_table(&self) -> &str {
        &self.entity_table
    }

    /// Type name of the closure entity.
    pub fn closure_class(&self) -> &str {
        &self.closure_class
    }

    /// Table holding one row per ancestor/descendant pair.
    pub fn closure_table(&self) -> &str {
        &self.closure_table
    }

    /// Module path the model types live in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Emit backend storage options (engine, charset) in generated DDL.
    pub fn use_extra_storage_options(&self) -> bool {
        self.use_extra_storage_options
    }

    pub fn position_policy(&self) -> PositionPolicy {
        self.position_policy
    }

    /// What happens to children when a node is hard-deleted.
    pub fn dependent_behavior(&self) -> DependentBehavior {
        self.dependent_behavior
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

/// Builder-style options consumed by the derive macro.
#[derive(Clone, Debug, Default)]
pub struct ClosureTableOptions {
    closure_class: Option<String>,
    closure_table: Option<String>,
    namespace: Option<String>,
    use_extra_storage_options: Option<bool>,
    position_policy: Option<PositionPolicy>,
    dependent_behavior: Option<DependentBehavior>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl ClosureTableOptions {
    pub fn closure_class(mut self, value: impl Into<String>) -> Self {
        self.closure_class = Some(value.into());
        self
    }

    pub fn closure_table(mut self, value: impl Into<String>) -> Self {
        self.closure_table = Some(value.into());
        self
    }

    pub fn namespace(mut self, value: impl Into<String>) -> Self {
        self.namespace = Some(value.into());
        self
    }

    pub fn use_extra_storage_options(mut self, value: bool) -> Self {
        self.use_extra_storage_options = Some(value);
        self
    }

    pub fn position_policy(mut self, policy: PositionPolicy) -> Self {
        self.position_policy = Some(policy);
        self
    }

    pub fn dependent_behavior(mut self, behavior: DependentBehavior) -> Self {
        self.dependent_behavior = Some(behavior);
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

/// Behaviour applied to the children of a hard-deleted node.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DependentBehavior {
    /// Children become roots (`parent_id` set to null).
    #[default]
    Nullify,
    /// The whole subtree is purged with the node.
    Destroy,
}

/// How a requested sibling position that is already taken is resolved.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PositionPolicy {
    /// Later siblings move down by one.
    #[default]
    AutoShift,
    /// Fail with [`ClosureTableError::Conflict`](crate::ClosureTableError::Conflict).
    Reject,
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

    fn derived_from(entity: &str, closure: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(entity.as_bytes());
        hasher.update(b"/");
        hasher.update(closure.as_bytes());
        let crc = hasher.finalize();
        Self(format!("closure-table::{entity}::{closure}::{crc:x}"))
    }
}

/// Configuration describing how to acquire advisory locks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    /// No lock is taken. Concurrent writers on PostgreSQL must then be
    /// serialized by the caller, through repeatable-read isolation or an
    /// external lock.
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
    fn defaults_follow_entity_names() {
        let config = ClosureTableConfig::new("Category", "categories");

        assert_eq!(config.closure_class(), "CategoryClosure");
        assert_eq!(config.closure_table(), "categories_closure");
        assert_eq!(config.namespace(), "");
        assert!(!config.use_extra_storage_options());
        assert_eq!(config.position_policy(), PositionPolicy::AutoShift);
        assert_eq!(config.dependent_behavior(), DependentBehavior::Nullify);
    }

    #[test]
    fn lock_key_is_stable_and_namespaced() {
        let a = ClosureTableConfig::new("Category", "categories");
        let b = ClosureTableConfig::new("Category", "other_table");
        let c = ClosureTableConfig::new("Menu", "menus");

        let key_a = a.advisory_lock_strategy().key().unwrap();
        assert!(key_a.as_str().starts_with("closure-table::Category::CategoryClosure::"));
        assert_eq!(a.advisory_lock_strategy(), b.advisory_lock_strategy());
        assert_ne!(a.advisory_lock_strategy(), c.advisory_lock_strategy());
    }

    #[test]
    fn options_override_defaults() {
        let config = ClosureTableOptions::default()
            .closure_class("CategoryTree")
            .closure_table("category_tree")
            .namespace("app::models")
            .use_extra_storage_options(true)
            .position_policy(PositionPolicy::Reject)
            .dependent_behavior(DependentBehavior::Destroy)
            .apply(ClosureTableConfig::new("Category", "categories"));

        assert_eq!(config.closure_class(), "CategoryTree");
        assert_eq!(config.closure_table(), "category_tree");
        assert_eq!(config.namespace(), "app::models");
        assert!(config.use_extra_storage_options());
        assert_eq!(config.position_policy(), PositionPolicy::Reject);
        assert_eq!(config.dependent_behavior(), DependentBehavior::Destroy);

        let key = config.advisory_lock_strategy().key().unwrap();
        assert!(key.as_str().contains("::CategoryTree::"));
    }

    #[test]
    fn explicit_lock_strategy_wins() {
        let config = ClosureTableOptions::default()
            .closure_class("CategoryTree")
            .advisory_lock_strategy(AdvisoryLockStrategy::Disabled)
            .apply(ClosureTableConfig::new("Category", "categories"));

        assert_eq!(config.advisory_lock_strategy(), &AdvisoryLockStrategy::Disabled);
        assert!(config.advisory_lock_strategy().key().is_none());
    }
}
