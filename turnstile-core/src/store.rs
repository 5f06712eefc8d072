//! Rule store trait definition.

use crate::error::Result;
use crate::name::{FeatureName, GroupName};
use crate::rules::{Breakdown, Rules};
use crate::value::ValueSet;
use async_trait::async_trait;

/// Storage contract implemented by every backend.
///
/// Names arrive already validated. Implementations must make `enable` and
/// `disable` safe under concurrent calls for the same feature and group:
/// the result has to match some serial order of the calls, so a racing
/// `enable` never drops another caller's values.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Static backend name, used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Provision storage. Must be idempotent.
    async fn setup(&self) -> Result<()>;

    /// Ensure a feature exists with no rules. No-op if it already exists.
    async fn add(&self, feature: &FeatureName) -> Result<()>;

    /// Delete a feature and all of its rules. No-op if absent.
    async fn remove(&self, feature: &FeatureName) -> Result<()>;

    /// Union `values` into the rule for `group`, creating the feature and the
    /// group entry as needed.
    async fn enable(&self, feature: &FeatureName, group: &GroupName, values: &ValueSet)
        -> Result<()>;

    /// Remove `values` from the rule for `group`, or the whole group entry
    /// when `values` is empty. No-op when the feature or group is absent.
    async fn disable(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> Result<()>;

    /// Move every rule of `from` to `to`, replacing whatever `to` held.
    ///
    /// Readers observe either the old or the new name, never both or neither.
    /// No-op when `from` is unknown or equal to `to`.
    async fn rename(&self, from: &FeatureName, to: &FeatureName) -> Result<()>;

    /// Whether the feature is known, or bound to `group` when one is given.
    async fn exists(&self, feature: &FeatureName, group: Option<&GroupName>) -> Result<bool>;

    /// Sorted feature names, optionally only those with a rule for `group`.
    async fn features(&self, group: Option<&GroupName>) -> Result<Vec<FeatureName>>;

    /// Rules of a single feature, `None` when the feature is unknown.
    async fn rules(&self, feature: &FeatureName) -> Result<Option<Rules>>;

    /// Every feature with its raw rules.
    async fn breakdown(&self) -> Result<Breakdown>;

    /// Delete every feature.
    async fn clear(&self) -> Result<()>;
}
