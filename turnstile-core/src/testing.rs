//! Conformance checks every [`RuleStore`] must pass.
//!
//! Backend crates run [`run_all`] against a live store from their integration
//! tests. Each check starts from a cleared store. Failures panic, so these are
//! only meant to be called from tests.

use crate::backup;
use crate::name::{FeatureName, GroupName};
use crate::store::RuleStore;
use crate::value::{RuleValue, ValueSet, value_set};
use std::sync::Arc;
use tokio::task::JoinSet;

fn feature(name: &str) -> FeatureName {
    FeatureName::new(name).expect("valid feature name")
}

fn group(name: &str) -> GroupName {
    GroupName::new(name).expect("valid group name")
}

async fn values_of(store: &dyn RuleStore, f: &str, g: &str) -> Option<ValueSet> {
    store
        .rules(&feature(f))
        .await
        .expect("rules")
        .and_then(|rules| rules.get(g).cloned())
}

/// Run every check in sequence.
pub async fn run_all(store: Arc<dyn RuleStore>) {
    store.setup().await.expect("setup");
    store.setup().await.expect("setup is idempotent");

    add_is_idempotent(store.as_ref()).await;
    remove_deletes_rules(store.as_ref()).await;
    merge_is_idempotent(store.as_ref()).await;
    disable_with_values_keeps_group(store.as_ref()).await;
    disable_without_values_removes_group(store.as_ref()).await;
    disable_missing_is_noop(store.as_ref()).await;
    rename_clobbers(store.as_ref()).await;
    rename_unknown_is_noop(store.as_ref()).await;
    features_sorted_and_filtered(store.as_ref()).await;
    breakdown_includes_empty_features(store.as_ref()).await;
    mixed_values_survive_storage(store.as_ref()).await;
    backup_round_trip(store.as_ref()).await;
    clear_removes_everything(store.as_ref()).await;
    concurrent_union(Arc::clone(&store)).await;
    concurrent_difference(Arc::clone(&store)).await;

    store.clear().await.expect("clear");
}

pub async fn add_is_idempotent(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store.add(&feature("search")).await.expect("add");
    store.add(&feature("search")).await.expect("add again");

    assert!(store.exists(&feature("search"), None).await.expect("exists"));
    assert_eq!(
        store.rules(&feature("search")).await.expect("rules"),
        Some(Default::default())
    );
    assert_eq!(store.rules(&feature("missing")).await.expect("rules"), None);

    store
        .enable(&feature("search"), &group("ids"), &value_set([1]))
        .await
        .expect("enable");
    store.add(&feature("search")).await.expect("add keeps rules");
    assert_eq!(
        values_of(store, "search", "ids").await,
        Some(value_set([1]))
    );
}

pub async fn remove_deletes_rules(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store
        .enable(&feature("search"), &group("ids"), &value_set([1]))
        .await
        .expect("enable");
    store.remove(&feature("search")).await.expect("remove");
    store.remove(&feature("search")).await.expect("remove absent");

    assert!(!store.exists(&feature("search"), None).await.expect("exists"));
    assert!(store.breakdown().await.expect("breakdown").is_empty());
}

pub async fn merge_is_idempotent(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    let values = value_set([3, 1, 2]);
    store
        .enable(&feature("search"), &group("ids"), &values)
        .await
        .expect("enable");
    store
        .enable(&feature("search"), &group("ids"), &values)
        .await
        .expect("enable again");
    assert_eq!(values_of(store, "search", "ids").await, Some(values));

    store
        .enable(&feature("search"), &group("ids"), &value_set([4, 1]))
        .await
        .expect("enable overlapping");
    assert_eq!(
        values_of(store, "search", "ids").await,
        Some(value_set([1, 2, 3, 4]))
    );
}

pub async fn disable_with_values_keeps_group(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store
        .enable(&feature("search"), &group("ids"), &value_set([1, 2, 3]))
        .await
        .expect("enable");
    store
        .disable(&feature("search"), &group("ids"), &value_set([2, 9]))
        .await
        .expect("disable");
    assert_eq!(
        values_of(store, "search", "ids").await,
        Some(value_set([1, 3]))
    );

    store
        .disable(&feature("search"), &group("ids"), &value_set([1, 3]))
        .await
        .expect("disable rest");
    assert_eq!(values_of(store, "search", "ids").await, Some(ValueSet::new()));
    assert!(
        store
            .exists(&feature("search"), Some(&group("ids")))
            .await
            .expect("exists")
    );
}

pub async fn disable_without_values_removes_group(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store
        .enable(&feature("search"), &group("ids"), &value_set([1]))
        .await
        .expect("enable");
    store
        .disable(&feature("search"), &group("ids"), &ValueSet::new())
        .await
        .expect("disable");

    assert!(
        !store
            .exists(&feature("search"), Some(&group("ids")))
            .await
            .expect("exists group")
    );
    assert!(store.exists(&feature("search"), None).await.expect("exists"));
}

pub async fn disable_missing_is_noop(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store
        .disable(&feature("ghost"), &group("ids"), &value_set([1]))
        .await
        .expect("disable values");
    store
        .disable(&feature("ghost"), &group("ids"), &ValueSet::new())
        .await
        .expect("disable group");
    assert!(!store.exists(&feature("ghost"), None).await.expect("exists"));

    store.add(&feature("search")).await.expect("add");
    store
        .disable(&feature("search"), &group("ids"), &value_set([1]))
        .await
        .expect("disable absent group");
    assert!(
        !store
            .exists(&feature("search"), Some(&group("ids")))
            .await
            .expect("exists group")
    );
}

pub async fn rename_clobbers(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store
        .enable(&feature("a"), &group("m"), &value_set([1]))
        .await
        .expect("enable a");
    store
        .enable(&feature("b"), &group("m"), &value_set([2]))
        .await
        .expect("enable b");
    store
        .enable(&feature("b"), &group("other"), &ValueSet::new())
        .await
        .expect("enable b other");
    store.rename(&feature("a"), &feature("b")).await.expect("rename");

    let breakdown = store.breakdown().await.expect("breakdown");
    assert_eq!(breakdown.len(), 1);
    let rules = &breakdown[&feature("b")];
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[&group("m")], value_set([1]));
}

pub async fn rename_unknown_is_noop(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store
        .enable(&feature("b"), &group("m"), &value_set([2]))
        .await
        .expect("enable");
    store
        .rename(&feature("missing"), &feature("b"))
        .await
        .expect("rename");
    assert_eq!(values_of(store, "b", "m").await, Some(value_set([2])));

    // A feature without rules still moves.
    store.add(&feature("bare")).await.expect("add");
    store
        .rename(&feature("bare"), &feature("moved"))
        .await
        .expect("rename bare");
    assert!(!store.exists(&feature("bare"), None).await.expect("exists"));
    assert!(store.exists(&feature("moved"), None).await.expect("exists"));

    store.rename(&feature("b"), &feature("b")).await.expect("rename onto itself");
    assert_eq!(values_of(store, "b", "m").await, Some(value_set([2])));
}

pub async fn features_sorted_and_filtered(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    for name in ["zeta", "alpha", "mid"] {
        store.add(&feature(name)).await.expect("add");
    }
    store
        .enable(&feature("zeta"), &group("staff"), &ValueSet::new())
        .await
        .expect("enable zeta");
    store
        .enable(&feature("alpha"), &group("staff"), &ValueSet::new())
        .await
        .expect("enable alpha");

    let all = store.features(None).await.expect("features");
    assert_eq!(all, vec![feature("alpha"), feature("mid"), feature("zeta")]);

    let staff = store
        .features(Some(&group("staff")))
        .await
        .expect("features in group");
    assert_eq!(staff, vec![feature("alpha"), feature("zeta")]);

    let none = store
        .features(Some(&group("nobody")))
        .await
        .expect("features in empty group");
    assert!(none.is_empty());
}

pub async fn breakdown_includes_empty_features(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store.add(&feature("empty")).await.expect("add");
    store
        .enable(&feature("search"), &group("ids"), &value_set([2, 1]))
        .await
        .expect("enable");

    let breakdown = store.breakdown().await.expect("breakdown");
    assert_eq!(breakdown.len(), 2);
    assert!(breakdown[&feature("empty")].is_empty());
    assert_eq!(breakdown[&feature("search")][&group("ids")], value_set([1, 2]));
}

pub async fn mixed_values_survive_storage(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    let mut values = value_set(["alice", "bob"]);
    values.insert(RuleValue::Int(-7));
    values.insert(RuleValue::Bool(true));
    values.insert(RuleValue::Float(0.5));
    store
        .enable(&feature("mixed"), &group("anything"), &values)
        .await
        .expect("enable");

    assert_eq!(values_of(store, "mixed", "anything").await, Some(values));
}

pub async fn backup_round_trip(store: &dyn RuleStore) {
    store.clear().await.expect("clear");

    store
        .enable(&feature("search"), &group("ids"), &value_set([1, 2]))
        .await
        .expect("enable");
    store
        .enable(&feature("search"), &group("staff"), &ValueSet::new())
        .await
        .expect("enable staff");
    store.add(&feature("empty")).await.expect("add");

    let before = store.breakdown().await.expect("breakdown");
    let document = backup::to_json(&before).expect("dump");

    store.clear().await.expect("clear");
    let parsed = backup::from_json(&document).expect("parse");
    backup::restore(store, &parsed).await.expect("restore");

    assert_eq!(store.breakdown().await.expect("breakdown"), before);
}

pub async fn clear_removes_everything(store: &dyn RuleStore) {
    store.add(&feature("a")).await.expect("add");
    store
        .enable(&feature("b"), &group("g"), &value_set([1]))
        .await
        .expect("enable");
    store.clear().await.expect("clear");

    assert!(store.features(None).await.expect("features").is_empty());
    assert!(store.breakdown().await.expect("breakdown").is_empty());
}

/// Distinct values enabled concurrently all end up in the set.
pub async fn concurrent_union(store: Arc<dyn RuleStore>) {
    store.clear().await.expect("clear");

    let mut tasks = JoinSet::new();
    for i in 0..32_i64 {
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            store
                .enable(&feature("race"), &group("ids"), &value_set([i]))
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task").expect("enable");
    }

    assert_eq!(
        values_of(store.as_ref(), "race", "ids").await,
        Some(value_set(0..32_i64))
    );
}

/// Disjoint concurrent disables all take effect.
pub async fn concurrent_difference(store: Arc<dyn RuleStore>) {
    store.clear().await.expect("clear");

    store
        .enable(&feature("race"), &group("ids"), &value_set([1, 2, 3, 4, 5]))
        .await
        .expect("enable");

    let mut tasks = JoinSet::new();
    for i in [1, 3, 5] {
        let store = Arc::clone(&store);
        tasks.spawn(async move {
            store
                .disable(&feature("race"), &group("ids"), &value_set([i]))
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task").expect("disable");
    }

    assert_eq!(
        values_of(store.as_ref(), "race", "ids").await,
        Some(value_set([2, 4]))
    );
}
