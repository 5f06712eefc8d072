//! Group registry.

use crate::error::Result;
use crate::name::GroupName;
use crate::value::ValueSet;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A group predicate: does `actor` belong to the group given the rule's values?
pub type Predicate<A> = Arc<dyn Fn(&A, &ValueSet) -> bool + Send + Sync>;

/// Process-local table of group predicates.
///
/// Groups are never persisted. Rules only reference groups by name, and a rule
/// naming a group that was never registered simply never matches.
pub struct GroupRegistry<A> {
    groups: DashMap<GroupName, Predicate<A>>,
}

impl<A> GroupRegistry<A> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Register a predicate, replacing any previous one under the same name.
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile_core::GroupRegistry;
    ///
    /// struct User { staff: bool }
    ///
    /// let registry = GroupRegistry::new();
    /// registry.register("staff", |user: &User, _values| user.staff).unwrap();
    ///
    /// assert!(registry.matches("staff", &User { staff: true }, &Default::default()));
    /// ```
    pub fn register<F>(&self, name: impl AsRef<str>, predicate: F) -> Result<()>
    where
        F: Fn(&A, &ValueSet) -> bool + Send + Sync + 'static,
    {
        let name = GroupName::new(name)?;
        debug!(group = %name, "Registering group");
        self.groups.insert(name, Arc::new(predicate));
        Ok(())
    }

    /// Remove a group. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.groups.remove(name.trim()).is_some()
    }

    /// Look up a predicate.
    pub fn get(&self, name: &str) -> Option<Predicate<A>> {
        self.groups.get(name.trim()).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a group is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name.trim())
    }

    /// Evaluate a single group. Unregistered groups never match.
    pub fn matches(&self, name: &str, actor: &A, values: &ValueSet) -> bool {
        // Clone the Arc out so the shard lock is not held while user code runs.
        match self.get(name) {
            Some(predicate) => predicate(actor, values),
            None => false,
        }
    }

    /// Registered group names, sorted.
    pub fn names(&self) -> Vec<GroupName> {
        let mut names: Vec<GroupName> = self.groups.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Remove every group.
    pub fn clear(&self) {
        self.groups.clear();
    }
}

impl<A> Default for GroupRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for GroupRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{RuleValue, value_set};

    #[test]
    fn test_register_and_match() {
        let registry: GroupRegistry<i64> = GroupRegistry::new();
        registry
            .register("ids", |id, values| values.contains(&RuleValue::Int(*id)))
            .unwrap();

        assert!(registry.matches("ids", &7, &value_set([7, 8])));
        assert!(!registry.matches("ids", &9, &value_set([7, 8])));
    }

    #[test]
    fn test_register_overwrites() {
        let registry: GroupRegistry<()> = GroupRegistry::new();
        registry.register("everyone", |_, _| false).unwrap();
        registry.register("everyone", |_, _| true).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.matches("everyone", &(), &ValueSet::new()));
    }

    #[test]
    fn test_unregistered_group_never_matches() {
        let registry: GroupRegistry<()> = GroupRegistry::new();
        assert!(!registry.matches("ghost", &(), &ValueSet::new()));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let registry: GroupRegistry<()> = GroupRegistry::new();
        assert!(registry.register("  ", |_, _| true).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_sorted_and_clear() {
        let registry: GroupRegistry<()> = GroupRegistry::new();
        registry.register("staff", |_, _| true).unwrap();
        registry.register("beta", |_, _| true).unwrap();

        let names: Vec<String> = registry.names().into_iter().map(String::from).collect();
        assert_eq!(names, vec!["beta", "staff"]);

        assert!(registry.unregister("beta"));
        registry.clear();
        assert!(registry.is_empty());
    }
}
