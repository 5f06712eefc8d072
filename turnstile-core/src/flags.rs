//! The public feature toggle API.

use crate::backup;
use crate::error::Result;
use crate::evaluator;
use crate::name::{FeatureName, GroupName};
use crate::registry::GroupRegistry;
use crate::rules::{ActorBreakdown, Breakdown};
use crate::store::RuleStore;
use crate::value::{RuleValue, ValueSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Feature toggles for actors of type `A`.
///
/// Combines a [`RuleStore`] with a [`GroupRegistry`]. Every name passed in is
/// validated here, before any backend is touched.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use turnstile_core::{MemoryStore, Turnstile};
///
/// struct User { staff: bool }
///
/// # #[tokio::main]
/// # async fn main() -> turnstile_core::Result<()> {
/// let flags = Turnstile::new(Arc::new(MemoryStore::new()));
/// flags.register("staff", |user: &User, _| user.staff)?;
///
/// flags.enable("search", "staff").await?;
/// assert!(flags.is_enabled("search", &User { staff: true }).await?);
/// assert!(!flags.is_enabled("search", &User { staff: false }).await?);
/// # Ok(())
/// # }
/// ```
pub struct Turnstile<A> {
    store: Arc<dyn RuleStore>,
    registry: Arc<GroupRegistry<A>>,
}

impl<A> Clone for Turnstile<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<A> Turnstile<A> {
    /// Create with an empty group registry.
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self::with_registry(store, Arc::new(GroupRegistry::new()))
    }

    /// Create with a registry shared with other instances.
    pub fn with_registry(store: Arc<dyn RuleStore>, registry: Arc<GroupRegistry<A>>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<GroupRegistry<A>> {
        &self.registry
    }

    /// Register a group predicate. Re-registering a name replaces it.
    pub fn register<F>(&self, group: impl AsRef<str>, predicate: F) -> Result<()>
    where
        F: Fn(&A, &ValueSet) -> bool + Send + Sync + 'static,
    {
        self.registry.register(group, predicate)
    }

    /// Registered group names.
    pub fn groups(&self) -> Vec<GroupName> {
        self.registry.names()
    }

    /// Provision the backend.
    pub async fn setup(&self) -> Result<()> {
        self.store.setup().await
    }

    /// Ensure a feature exists.
    pub async fn add(&self, feature: &str) -> Result<()> {
        let feature = FeatureName::new(feature)?;
        debug!(backend = self.store.backend(), feature = %feature, "Adding feature");
        self.store.add(&feature).await
    }

    /// Delete a feature and its rules.
    pub async fn remove(&self, feature: &str) -> Result<()> {
        let feature = FeatureName::new(feature)?;
        debug!(backend = self.store.backend(), feature = %feature, "Removing feature");
        self.store.remove(&feature).await
    }

    /// Bind `group` to `feature` with no values.
    pub async fn enable(&self, feature: &str, group: &str) -> Result<()> {
        self.enable_with(feature, group, std::iter::empty::<RuleValue>())
            .await
    }

    /// Bind `group` to `feature`, merging `values` into any existing ones.
    pub async fn enable_with<I, V>(&self, feature: &str, group: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<RuleValue>,
    {
        let feature = FeatureName::new(feature)?;
        let group = GroupName::new(group)?;
        let values: ValueSet = values.into_iter().map(Into::into).collect();

        debug!(
            backend = self.store.backend(),
            feature = %feature,
            group = %group,
            values = values.len(),
            "Enabling feature"
        );
        self.store.enable(&feature, &group, &values).await
    }

    /// Unbind `group` from `feature` entirely.
    pub async fn disable(&self, feature: &str, group: &str) -> Result<()> {
        self.disable_with(feature, group, std::iter::empty::<RuleValue>())
            .await
    }

    /// Remove `values` from the rule for `group`; an empty iterator unbinds
    /// the group entirely.
    pub async fn disable_with<I, V>(&self, feature: &str, group: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<RuleValue>,
    {
        let feature = FeatureName::new(feature)?;
        let group = GroupName::new(group)?;
        let values: ValueSet = values.into_iter().map(Into::into).collect();

        debug!(
            backend = self.store.backend(),
            feature = %feature,
            group = %group,
            values = values.len(),
            "Disabling feature"
        );
        self.store.disable(&feature, &group, &values).await
    }

    /// Move all rules of `from` to `to`, replacing anything `to` had.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = FeatureName::new(from)?;
        let to = FeatureName::new(to)?;
        if from == to {
            return Ok(());
        }

        debug!(backend = self.store.backend(), from = %from, to = %to, "Renaming feature");
        self.store.rename(&from, &to).await
    }

    /// Whether the feature is known.
    pub async fn exists(&self, feature: &str) -> Result<bool> {
        let feature = FeatureName::new(feature)?;
        self.store.exists(&feature, None).await
    }

    /// Whether the feature has a rule for `group`.
    pub async fn exists_in_group(&self, feature: &str, group: &str) -> Result<bool> {
        let feature = FeatureName::new(feature)?;
        let group = GroupName::new(group)?;
        self.store.exists(&feature, Some(&group)).await
    }

    /// Every known feature, sorted.
    pub async fn features(&self) -> Result<Vec<FeatureName>> {
        self.store.features(None).await
    }

    /// Features with a rule for `group`, sorted.
    pub async fn features_in_group(&self, group: &str) -> Result<Vec<FeatureName>> {
        let group = GroupName::new(group)?;
        self.store.features(Some(&group)).await
    }

    /// Whether `feature` is enabled for `actor`. Unknown features are disabled.
    pub async fn is_enabled(&self, feature: &str, actor: &A) -> Result<bool> {
        let feature = FeatureName::new(feature)?;
        Ok(match self.store.rules(&feature).await? {
            Some(rules) => evaluator::evaluate(&rules, actor, &self.registry),
            None => false,
        })
    }

    /// Raw rules of every feature, unevaluated.
    pub async fn breakdown(&self) -> Result<Breakdown> {
        self.store.breakdown().await
    }

    /// Every feature evaluated for `actor`.
    pub async fn breakdown_for(&self, actor: &A) -> Result<ActorBreakdown> {
        let breakdown = self.store.breakdown().await?;
        Ok(evaluator::evaluate_all(&breakdown, actor, &self.registry))
    }

    /// Delete every feature. Registered groups are kept.
    pub async fn clear(&self) -> Result<()> {
        debug!(backend = self.store.backend(), "Clearing features");
        self.store.clear().await
    }

    /// Write the raw breakdown to a JSON backup file.
    pub async fn dump(&self, path: impl AsRef<Path>) -> Result<usize> {
        backup::dump(self.store.as_ref(), path).await
    }

    /// Re-apply a JSON backup file on top of the current rules.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<usize> {
        backup::load(self.store.as_ref(), path).await
    }

    /// The raw breakdown as a JSON document.
    pub async fn dump_json(&self) -> Result<String> {
        backup::to_json(&self.store.breakdown().await?)
    }

    /// Re-apply a JSON document on top of the current rules.
    pub async fn load_json(&self, document: &str) -> Result<usize> {
        let breakdown = backup::from_json(document)?;
        backup::restore(self.store.as_ref(), &breakdown).await
    }
}
