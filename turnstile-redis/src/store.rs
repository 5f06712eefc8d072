//! Redis-backed rule store.
//!
//! Layout:
//!
//! - `{set_key}` is a set with every known feature name.
//! - `{prefix}:{feature}` is a hash from group name to an encoded value set.
//!
//! A feature without rules exists only in the set. Mutations of a single
//! group entry use `WATCH`/`MULTI`/`EXEC` so concurrent writers never lose
//! each other's values. `clear` watches the set the same way, and `rename`
//! runs as a Lua script.

use async_trait::async_trait;
use redis::Script;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use turnstile_core::rules::{self, Breakdown, Rules};
use turnstile_core::{FeatureName, GroupName, RuleStore, Serializer, ValueSet};

use crate::pool::{RedisConnection, RedisPool, RedisPoolBuilder};
use crate::{RedisConfig, RedisError, Result};

const BACKEND: &str = "redis";

// KEYS: membership set, source hash, destination hash. ARGV: from, to.
const RENAME_SCRIPT: &str = r#"
if redis.call('SISMEMBER', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('DEL', KEYS[3])
if redis.call('EXISTS', KEYS[2]) == 1 then
    redis.call('RENAME', KEYS[2], KEYS[3])
end
redis.call('SREM', KEYS[1], ARGV[1])
redis.call('SADD', KEYS[1], ARGV[2])
return 1
"#;

/// Rule store keeping one Redis hash per feature.
#[derive(Clone)]
pub struct RedisStore {
    pool: RedisPool,
    config: Arc<RedisConfig>,
    serializer: Arc<dyn Serializer>,
    rename_script: Arc<Script>,
}

enum Update {
    Write(ValueSet),
    Unchanged,
}

enum Attempt {
    Committed,
    Unchanged,
    Contended,
}

impl RedisStore {
    /// Connect a new pool and wrap it.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        config.validate()?;
        let pool = RedisPoolBuilder::new(&config).build().await?;
        Ok(Self::from_pool(pool, config))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: RedisPool, config: RedisConfig) -> Self {
        let serializer = config.serializer.build();
        Self {
            pool,
            config: Arc::new(config),
            serializer,
            rename_script: Arc::new(Script::new(RENAME_SCRIPT)),
        }
    }

    /// Replace the value set encoding.
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    fn key(&self, feature: &FeatureName) -> String {
        self.config.feature_key(feature.as_str())
    }

    async fn conn(&self) -> Result<RedisConnection<'_>> {
        Ok(self.pool.get().await?)
    }

    fn decode_rules(&self, key: &str, raw: HashMap<String, Vec<u8>>) -> Result<Rules> {
        raw.into_iter()
            .map(|(group, bytes)| -> Result<(GroupName, ValueSet)> {
                let group = GroupName::new(group).map_err(|e| RedisError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                Ok((group, self.serializer.decode(&bytes)?))
            })
            .collect()
    }

    fn decode_names(&self, raw: Vec<String>) -> Result<Vec<FeatureName>> {
        let mut names = raw
            .into_iter()
            .map(|name| {
                FeatureName::new(&name).map_err(|e| RedisError::Corrupt {
                    key: self.config.set_key.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    /// Optimistically rewrite one group entry.
    ///
    /// `update` sees the stored value set (`None` if the entry is absent) and
    /// decides what to write. The write only commits if nobody touched the
    /// feature hash since it was read.
    async fn check_and_set<F>(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        register: bool,
        update: F,
    ) -> Result<()>
    where
        F: Fn(Option<ValueSet>) -> Update,
    {
        let key = self.key(feature);
        let mut conn = self.conn().await?;

        for attempt in 1..=self.config.max_cas_attempts {
            match self
                .write_entry(&mut conn, &key, feature, group, register, &update)
                .await
            {
                Ok(Attempt::Committed) => {
                    trace!(key = %key, group = %group, attempt, "Rule entry written");
                    return Ok(());
                }
                Ok(Attempt::Unchanged) => return Ok(()),
                Ok(Attempt::Contended) => {
                    trace!(key = %key, group = %group, attempt, "Watched key changed, retrying");
                }
                Err(e) => {
                    unwatch(&mut conn).await;
                    return Err(e);
                }
            }
        }

        warn!(
            key = %key,
            attempts = self.config.max_cas_attempts,
            "Giving up on contended rule entry"
        );
        Err(RedisError::Conflict {
            key,
            attempts: self.config.max_cas_attempts,
        })
    }

    /// One WATCH/HGET/MULTI/EXEC round of [`Self::check_and_set`].
    async fn write_entry<F>(
        &self,
        conn: &mut RedisConnection<'_>,
        key: &str,
        feature: &FeatureName,
        group: &GroupName,
        register: bool,
        update: &F,
    ) -> Result<Attempt>
    where
        F: Fn(Option<ValueSet>) -> Update,
    {
        let _: () = redis::cmd("WATCH").arg(key).query_async(&mut **conn).await?;

        let stored: Option<Vec<u8>> = redis::cmd("HGET")
            .arg(key)
            .arg(group.as_str())
            .query_async(&mut **conn)
            .await?;

        let current = stored
            .map(|bytes| self.serializer.decode(&bytes))
            .transpose()?;
        let next = match update(current) {
            Update::Write(next) => next,
            Update::Unchanged => {
                let _: () = redis::cmd("UNWATCH").query_async(&mut **conn).await?;
                return Ok(Attempt::Unchanged);
            }
        };
        let bytes = self.serializer.encode(&next)?;

        let mut pipe = redis::pipe();
        pipe.atomic().hset(key, group.as_str(), bytes).ignore();
        if register {
            pipe.sadd(&self.config.set_key, feature.as_str()).ignore();
        }

        // EXEC replies nil when a watched key changed.
        let committed: Option<redis::Value> = pipe.query_async(&mut **conn).await?;
        Ok(if committed.is_some() {
            Attempt::Committed
        } else {
            Attempt::Contended
        })
    }

    /// Run a MULTI/EXEC pipeline that has no precondition of its own.
    ///
    /// A nil EXEC can still happen when an abandoned check-and-set left a WATCH
    /// on the pooled connection. EXEC clears every watch, so the pipeline is
    /// simply sent again.
    async fn exec(
        &self,
        conn: &mut RedisConnection<'_>,
        key: &str,
        pipe: &redis::Pipeline,
    ) -> Result<()> {
        for _ in 0..self.config.max_cas_attempts {
            let committed: Option<redis::Value> = pipe.query_async(&mut **conn).await?;
            if committed.is_some() {
                return Ok(());
            }
            trace!(key = %key, "Stale watch aborted transaction, retrying");
        }
        Err(RedisError::Conflict {
            key: key.to_string(),
            attempts: self.config.max_cas_attempts,
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }

    async fn insert(&self, feature: &FeatureName) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("SADD")
            .arg(&self.config.set_key)
            .arg(feature.as_str())
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, feature: &FeatureName) -> Result<()> {
        let key = self.key(feature);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&key)
            .ignore()
            .srem(&self.config.set_key, feature.as_str())
            .ignore();

        let mut conn = self.conn().await?;
        self.exec(&mut conn, &key, &pipe).await
    }

    async fn merge_values(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> Result<()> {
        self.check_and_set(feature, group, true, |current| match current {
            Some(mut stored) => {
                if values.is_subset(&stored) {
                    Update::Unchanged
                } else {
                    rules::merge(&mut stored, values);
                    Update::Write(stored)
                }
            }
            None => Update::Write(values.clone()),
        })
        .await
    }

    async fn subtract_values(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> Result<()> {
        self.check_and_set(feature, group, false, |current| match current {
            Some(mut stored) if !stored.is_disjoint(values) => {
                rules::difference(&mut stored, values);
                Update::Write(stored)
            }
            _ => Update::Unchanged,
        })
        .await
    }

    async fn drop_group(&self, feature: &FeatureName, group: &GroupName) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("HDEL")
            .arg(self.key(feature))
            .arg(group.as_str())
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn move_feature(&self, from: &FeatureName, to: &FeatureName) -> Result<bool> {
        if from == to {
            return self.contains(from, None).await;
        }
        let mut conn = self.conn().await?;
        let moved: i32 = self
            .rename_script
            .key(&self.config.set_key)
            .key(self.key(from))
            .key(self.key(to))
            .arg(from.as_str())
            .arg(to.as_str())
            .invoke_async(&mut *conn)
            .await?;
        Ok(moved == 1)
    }

    async fn contains(&self, feature: &FeatureName, group: Option<&GroupName>) -> Result<bool> {
        let mut conn = self.conn().await?;
        let found: bool = match group {
            None => {
                redis::cmd("SISMEMBER")
                    .arg(&self.config.set_key)
                    .arg(feature.as_str())
                    .query_async(&mut *conn)
                    .await?
            }
            Some(group) => {
                redis::cmd("HEXISTS")
                    .arg(self.key(feature))
                    .arg(group.as_str())
                    .query_async(&mut *conn)
                    .await?
            }
        };
        Ok(found)
    }

    async fn names(&self, group: Option<&GroupName>) -> Result<Vec<FeatureName>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&self.config.set_key)
            .query_async(&mut *conn)
            .await?;

        let Some(group) = group else {
            return self.decode_names(members);
        };
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for name in &members {
            pipe.hexists(self.config.feature_key(name), group.as_str());
        }
        let bound: Vec<bool> = pipe.query_async(&mut *conn).await?;

        let matching = members
            .into_iter()
            .zip(bound)
            .filter_map(|(name, bound)| bound.then_some(name))
            .collect();
        self.decode_names(matching)
    }

    async fn load(&self, feature: &FeatureName) -> Result<Option<Rules>> {
        let key = self.key(feature);
        let mut conn = self.conn().await?;
        let (known, raw): (bool, HashMap<String, Vec<u8>>) = redis::pipe()
            .sismember(&self.config.set_key, feature.as_str())
            .hgetall(&key)
            .query_async(&mut *conn)
            .await?;

        if !known {
            return Ok(None);
        }
        self.decode_rules(&key, raw).map(Some)
    }

    async fn load_all(&self) -> Result<Breakdown> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&self.config.set_key)
            .query_async(&mut *conn)
            .await?;
        let names = self.decode_names(members)?;
        if names.is_empty() {
            return Ok(Breakdown::new());
        }

        let mut pipe = redis::pipe();
        for name in &names {
            pipe.hgetall(self.key(name));
        }
        let hashes: Vec<HashMap<String, Vec<u8>>> = pipe.query_async(&mut *conn).await?;

        names
            .into_iter()
            .zip(hashes)
            .map(|(name, raw)| -> Result<(FeatureName, Rules)> {
                let rules = self.decode_rules(&self.key(&name), raw)?;
                Ok((name, rules))
            })
            .collect()
    }

    /// Delete every feature hash and the membership set.
    ///
    /// The set is watched while its members are listed, so a feature that
    /// joins before the EXEC aborts the round instead of leaving its hash
    /// behind.
    async fn delete_all(&self) -> Result<()> {
        let set_key = &self.config.set_key;
        let mut conn = self.conn().await?;

        for attempt in 1..=self.config.max_cas_attempts {
            match self.delete_members(&mut conn).await {
                Ok(Some(count)) => {
                    debug!(features = count, attempt, "Cleared Redis rule store");
                    return Ok(());
                }
                Ok(None) => {
                    trace!(key = %set_key, attempt, "Feature set changed, retrying clear");
                }
                Err(e) => {
                    unwatch(&mut conn).await;
                    return Err(e);
                }
            }
        }

        warn!(
            key = %set_key,
            attempts = self.config.max_cas_attempts,
            "Giving up on contended clear"
        );
        Err(RedisError::Conflict {
            key: set_key.clone(),
            attempts: self.config.max_cas_attempts,
        })
    }

    /// One round of [`Self::delete_all`]. `None` when the EXEC was aborted.
    async fn delete_members(&self, conn: &mut RedisConnection<'_>) -> Result<Option<usize>> {
        let set_key = &self.config.set_key;
        let _: () = redis::cmd("WATCH")
            .arg(set_key)
            .query_async(&mut **conn)
            .await?;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(set_key)
            .query_async(&mut **conn)
            .await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for name in &members {
            pipe.del(self.config.feature_key(name)).ignore();
        }
        pipe.del(set_key).ignore();

        let committed: Option<redis::Value> = pipe.query_async(&mut **conn).await?;
        Ok(committed.map(|_| members.len()))
    }
}

/// Drop any WATCH before the connection goes back to the pool.
///
/// Best effort: the connection may be the reason the caller is bailing out.
async fn unwatch(conn: &mut RedisConnection<'_>) {
    let reset: redis::RedisResult<()> = redis::cmd("UNWATCH").query_async(&mut **conn).await;
    if let Err(e) = reset {
        trace!(error = %e, "UNWATCH failed");
    }
}

#[async_trait]
impl RuleStore for RedisStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn setup(&self) -> turnstile_core::Result<()> {
        // Keys are created on first write.
        Ok(self.ping().await?)
    }

    async fn add(&self, feature: &FeatureName) -> turnstile_core::Result<()> {
        Ok(self.insert(feature).await?)
    }

    async fn remove(&self, feature: &FeatureName) -> turnstile_core::Result<()> {
        Ok(self.delete(feature).await?)
    }

    async fn enable(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> turnstile_core::Result<()> {
        Ok(self.merge_values(feature, group, values).await?)
    }

    async fn disable(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> turnstile_core::Result<()> {
        if values.is_empty() {
            Ok(self.drop_group(feature, group).await?)
        } else {
            Ok(self.subtract_values(feature, group, values).await?)
        }
    }

    async fn rename(&self, from: &FeatureName, to: &FeatureName) -> turnstile_core::Result<()> {
        let moved = self.move_feature(from, to).await?;
        if !moved {
            debug!(from = %from, to = %to, "Rename source unknown, nothing moved");
        }
        Ok(())
    }

    async fn exists(
        &self,
        feature: &FeatureName,
        group: Option<&GroupName>,
    ) -> turnstile_core::Result<bool> {
        Ok(self.contains(feature, group).await?)
    }

    async fn features(&self, group: Option<&GroupName>) -> turnstile_core::Result<Vec<FeatureName>> {
        Ok(self.names(group).await?)
    }

    async fn rules(&self, feature: &FeatureName) -> turnstile_core::Result<Option<Rules>> {
        Ok(self.load(feature).await?)
    }

    async fn breakdown(&self) -> turnstile_core::Result<Breakdown> {
        Ok(self.load_all().await?)
    }

    async fn clear(&self) -> turnstile_core::Result<()> {
        Ok(self.delete_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_script_touches_declared_keys_only() {
        assert!(RENAME_SCRIPT.contains("KEYS[1]"));
        assert!(RENAME_SCRIPT.contains("KEYS[3]"));
        assert!(!RENAME_SCRIPT.contains("KEYS[4]"));
    }

    #[test]
    fn test_feature_keys_follow_prefix() {
        let config = RedisConfig::builder().prefix("flags").build().unwrap();
        let feature = FeatureName::new("Search").unwrap();
        assert_eq!(config.feature_key(feature.as_str()), "flags:search");
    }
}
