//! In-process rule store.
//!
//! One writer task owns every mutation. Requests are queued on a channel and
//! applied one at a time in arrival order, so there is never a concurrent
//! read-modify-write. Readers take a cheap copy of the current snapshot
//! pointer and never block on the writer's work.
//!
//! Each feature's rules sit behind their own `Arc`. A write copies the map of
//! pointers and clones only the entry it changes; every other entry is shared
//! with the previous snapshot.

use crate::error::{Error, Result};
use crate::name::{FeatureName, GroupName};
use crate::rules::{self, Breakdown, Rules};
use crate::store::RuleStore;
use crate::value::ValueSet;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

type Table = BTreeMap<FeatureName, Arc<Rules>>;

const MAILBOX_CAPACITY: usize = 1024;

#[derive(Debug)]
enum Mutation {
    Add(FeatureName),
    Remove(FeatureName),
    Enable(FeatureName, GroupName, ValueSet),
    Disable(FeatureName, GroupName, ValueSet),
    Rename(FeatureName, FeatureName),
    Clear,
}

struct Command {
    mutation: Mutation,
    reply: oneshot::Sender<()>,
}

/// In-process rule store backed by a single writer task.
#[derive(Clone)]
pub struct MemoryStore {
    mailbox: mpsc::Sender<Command>,
    snapshot: Arc<RwLock<Arc<Table>>>,
}

impl MemoryStore {
    /// Create a store and spawn its writer task.
    ///
    /// The writer stops once every clone of the store has been dropped.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, as [`tokio::spawn`] does.
    pub fn new() -> Self {
        let (mailbox, receiver) = mpsc::channel(MAILBOX_CAPACITY);
        let snapshot = Arc::new(RwLock::new(Arc::new(Table::new())));

        tokio::spawn(run_writer(receiver, Arc::clone(&snapshot)));
        debug!("Memory rule store started");

        Self { mailbox, snapshot }
    }

    fn current(&self) -> Arc<Table> {
        self.snapshot.read().clone()
    }

    async fn submit(&self, mutation: Mutation) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.mailbox
            .send(Command { mutation, reply })
            .await
            .map_err(|_| Error::WriterStopped)?;
        done.await.map_err(|_| Error::WriterStopped)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_writer(mut receiver: mpsc::Receiver<Command>, snapshot: Arc<RwLock<Arc<Table>>>) {
    while let Some(Command { mutation, reply }) = receiver.recv().await {
        trace!(?mutation, "Applying mutation");

        let mut table = snapshot.read().clone();
        if apply(Arc::make_mut(&mut table), mutation) {
            *snapshot.write() = table;
        }

        // The caller may have given up waiting; the write stands regardless.
        let _ = reply.send(());
    }

    debug!("Memory rule store writer stopped");
}

/// Apply one mutation to the table. Returns whether anything changed.
fn apply(table: &mut Table, mutation: Mutation) -> bool {
    match mutation {
        Mutation::Add(feature) => {
            if table.contains_key(&feature) {
                return false;
            }
            table.insert(feature, Arc::default());
            true
        }
        Mutation::Remove(feature) => table.remove(&feature).is_some(),
        Mutation::Enable(feature, group, values) => {
            let rules = table.entry(feature).or_default();
            rules::apply_enable(Arc::make_mut(rules), &group, &values);
            true
        }
        Mutation::Disable(feature, group, values) => match table.get_mut(&feature) {
            Some(rules) if rules.contains_key(&group) => {
                rules::apply_disable(Arc::make_mut(rules), &group, &values)
            }
            _ => false,
        },
        Mutation::Rename(from, to) => match table.remove(&from) {
            Some(rules) => {
                table.insert(to, rules);
                true
            }
            None => false,
        },
        Mutation::Clear => {
            let changed = !table.is_empty();
            table.clear();
            changed
        }
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn add(&self, feature: &FeatureName) -> Result<()> {
        self.submit(Mutation::Add(feature.clone())).await
    }

    async fn remove(&self, feature: &FeatureName) -> Result<()> {
        self.submit(Mutation::Remove(feature.clone())).await
    }

    async fn enable(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> Result<()> {
        self.submit(Mutation::Enable(
            feature.clone(),
            group.clone(),
            values.clone(),
        ))
        .await
    }

    async fn disable(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> Result<()> {
        self.submit(Mutation::Disable(
            feature.clone(),
            group.clone(),
            values.clone(),
        ))
        .await
    }

    async fn rename(&self, from: &FeatureName, to: &FeatureName) -> Result<()> {
        self.submit(Mutation::Rename(from.clone(), to.clone())).await
    }

    async fn exists(&self, feature: &FeatureName, group: Option<&GroupName>) -> Result<bool> {
        let table = self.current();
        Ok(match (table.get(feature), group) {
            (Some(rules), Some(group)) => rules.contains_key(group),
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    async fn features(&self, group: Option<&GroupName>) -> Result<Vec<FeatureName>> {
        let table = self.current();
        Ok(table
            .iter()
            .filter(|(_, rules)| group.is_none_or(|g| rules.contains_key(g)))
            .map(|(feature, _)| feature.clone())
            .collect())
    }

    async fn rules(&self, feature: &FeatureName) -> Result<Option<Rules>> {
        Ok(self.current().get(feature).map(|rules| rules.as_ref().clone()))
    }

    async fn breakdown(&self) -> Result<Breakdown> {
        Ok(self
            .current()
            .iter()
            .map(|(feature, rules)| (feature.clone(), rules.as_ref().clone()))
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.submit(Mutation::Clear).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::value_set;

    fn feature(name: &str) -> FeatureName {
        FeatureName::new(name).unwrap()
    }

    fn group(name: &str) -> GroupName {
        GroupName::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = MemoryStore::new();
        store
            .enable(&feature("search"), &group("ids"), &value_set([1]))
            .await
            .unwrap();
        store.add(&feature("search")).await.unwrap();

        let rules = store.rules(&feature("search")).await.unwrap().unwrap();
        assert_eq!(rules[&group("ids")], value_set([1]));
    }

    #[tokio::test]
    async fn test_disable_absent_feature_does_not_create() {
        let store = MemoryStore::new();
        store
            .disable(&feature("ghost"), &group("ids"), &value_set([1]))
            .await
            .unwrap();
        assert!(!store.exists(&feature("ghost"), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let store = MemoryStore::new();
        store.add(&feature("a")).await.unwrap();

        let before = store.current();
        store.add(&feature("b")).await.unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(store.current().len(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        other.add(&feature("shared")).await.unwrap();
        assert!(store.exists(&feature("shared"), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_unknown_is_noop() {
        let store = MemoryStore::new();
        store
            .enable(&feature("b"), &group("ids"), &value_set([2]))
            .await
            .unwrap();
        store.rename(&feature("a"), &feature("b")).await.unwrap();

        let rules = store.rules(&feature("b")).await.unwrap().unwrap();
        assert_eq!(rules[&group("ids")], value_set([2]));
    }

    #[tokio::test]
    async fn test_writes_share_untouched_entries() {
        let store = MemoryStore::new();
        store
            .enable(&feature("a"), &group("ids"), &value_set([1]))
            .await
            .unwrap();
        store
            .enable(&feature("b"), &group("ids"), &value_set([2]))
            .await
            .unwrap();

        let before = store.current();
        store
            .enable(&feature("b"), &group("ids"), &value_set([3]))
            .await
            .unwrap();
        let after = store.current();

        assert!(Arc::ptr_eq(&before[&feature("a")], &after[&feature("a")]));
        assert!(!Arc::ptr_eq(&before[&feature("b")], &after[&feature("b")]));
        assert_eq!(before[&feature("b")][&group("ids")], value_set([2]));
    }

    #[test]
    #[should_panic]
    fn test_new_outside_runtime_panics() {
        let _ = MemoryStore::new();
    }

    #[test]
    fn test_apply_reports_changes() {
        let mut table = Table::new();
        assert!(apply(&mut table, Mutation::Add(feature("a"))));
        assert!(!apply(&mut table, Mutation::Add(feature("a"))));
        assert!(!apply(&mut table, Mutation::Remove(feature("b"))));
        assert!(apply(&mut table, Mutation::Clear));
        assert!(!apply(&mut table, Mutation::Clear));
    }
}
