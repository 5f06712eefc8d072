//! PostgreSQL-backed rule store.

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, QueryResult, Statement, TransactionTrait,
    Value,
};
use tracing::{debug, info};
use turnstile_core::rules::{self, Breakdown, Rules};
use turnstile_core::{FeatureName, GroupName, RuleStore, ValueSet};

use crate::sql::Queries;
use crate::{Database, DatabaseConfig, SeaOrmError, SeaOrmResult};

const BACKEND: &str = "postgres";

/// Rule store keeping one row per feature, rules in a JSONB column.
///
/// Transaction boundaries:
///
/// - `enable` is one upsert statement.
/// - `disable` with values locks the row, diffs in Rust and writes back.
/// - `rename` locks the source row, drops the destination and renames.
///
/// Everything else is a single statement.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: Database,
    queries: Queries,
}

fn statement(sql: String, values: impl IntoIterator<Item = Value>) -> Statement {
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

fn text(value: &str) -> Value {
    Value::from(value.to_string())
}

fn json(values: &ValueSet) -> SeaOrmResult<Value> {
    let document = serde_json::to_value(values)
        .map_err(|e| turnstile_core::Error::Serialization(e.to_string()))?;
    Ok(Value::Json(Some(Box::new(document))))
}

fn found(row: Option<QueryResult>) -> SeaOrmResult<bool> {
    match row {
        Some(row) => Ok(row.try_get::<bool>("", "found")?),
        None => Ok(false),
    }
}

async fn commit(txn: DatabaseTransaction) -> SeaOrmResult<()> {
    txn.commit()
        .await
        .map_err(|e| SeaOrmError::Transaction(e.to_string()))
}

impl SeaOrmStore {
    /// Connect to the database described by `config`.
    pub async fn connect(config: DatabaseConfig) -> SeaOrmResult<Self> {
        Ok(Self::new(Database::connect(config).await?))
    }

    /// Wrap an open connection.
    pub fn new(db: Database) -> Self {
        let queries = Queries::new(&db.config().table);
        Self { db, queries }
    }

    /// The wrapped connection.
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn begin(&self) -> SeaOrmResult<DatabaseTransaction> {
        self.db
            .connection()
            .begin()
            .await
            .map_err(|e| SeaOrmError::Transaction(e.to_string()))
    }

    async fn create_table(&self) -> SeaOrmResult<()> {
        self.db.ping().await?;
        self.db
            .execute(statement(self.queries.create_table(), []))
            .await?;
        info!(table = %self.db.config().table, "Rule table ready");
        Ok(())
    }

    async fn insert(&self, feature: &FeatureName) -> SeaOrmResult<()> {
        self.db
            .execute(statement(self.queries.insert(), [text(feature.as_str())]))
            .await?;
        Ok(())
    }

    async fn delete(&self, feature: &FeatureName) -> SeaOrmResult<()> {
        self.db
            .execute(statement(self.queries.delete(), [text(feature.as_str())]))
            .await?;
        Ok(())
    }

    async fn merge_values(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> SeaOrmResult<()> {
        self.db
            .execute(statement(
                self.queries.merge(),
                [text(feature.as_str()), text(group.as_str()), json(values)?],
            ))
            .await?;
        Ok(())
    }

    async fn subtract_values(
        &self,
        feature: &FeatureName,
        group: &GroupName,
        values: &ValueSet,
    ) -> SeaOrmResult<()> {
        let txn = self.begin().await?;

        let row = txn
            .query_one(statement(
                self.queries.select_entry_for_update(),
                [text(feature.as_str()), text(group.as_str())],
            ))
            .await?;
        let entry = match row {
            Some(row) => row.try_get::<Option<serde_json::Value>>("", "entry")?,
            None => None,
        };
        let Some(entry) = entry else {
            // Dropping the transaction rolls it back and releases the lock.
            return Ok(());
        };

        let mut stored: ValueSet = serde_json::from_value(entry)
            .map_err(|e| SeaOrmError::corrupt(feature.as_str(), e))?;
        if stored.is_disjoint(values) {
            return Ok(());
        }
        rules::difference(&mut stored, values);

        txn.execute(statement(
            self.queries.replace_entry(),
            [text(feature.as_str()), text(group.as_str()), json(&stored)?],
        ))
        .await?;
        commit(txn).await
    }

    async fn drop_group(&self, feature: &FeatureName, group: &GroupName) -> SeaOrmResult<()> {
        self.db
            .execute(statement(
                self.queries.drop_entry(),
                [text(feature.as_str()), text(group.as_str())],
            ))
            .await?;
        Ok(())
    }

    async fn move_feature(&self, from: &FeatureName, to: &FeatureName) -> SeaOrmResult<bool> {
        if from == to {
            return self.contains(from, None).await;
        }
        let txn = self.begin().await?;

        let locked = txn
            .query_one(statement(self.queries.lock(), [text(from.as_str())]))
            .await?;
        if locked.is_none() {
            return Ok(false);
        }

        txn.execute(statement(self.queries.delete(), [text(to.as_str())]))
            .await?;
        txn.execute(statement(
            self.queries.rename(),
            [text(from.as_str()), text(to.as_str())],
        ))
        .await?;
        commit(txn).await?;
        Ok(true)
    }

    async fn contains(&self, feature: &FeatureName, group: Option<&GroupName>) -> SeaOrmResult<bool> {
        let stmt = match group {
            None => statement(self.queries.exists(), [text(feature.as_str())]),
            Some(group) => statement(
                self.queries.exists_in_group(),
                [text(feature.as_str()), text(group.as_str())],
            ),
        };
        found(self.db.query_one(stmt).await?)
    }

    async fn names(&self, group: Option<&GroupName>) -> SeaOrmResult<Vec<FeatureName>> {
        let stmt = match group {
            None => statement(self.queries.names(), []),
            Some(group) => statement(self.queries.names_in_group(), [text(group.as_str())]),
        };

        self.db
            .query_all(stmt)
            .await?
            .into_iter()
            .map(|row| -> SeaOrmResult<FeatureName> {
                let name = row.try_get::<String>("", "name")?;
                Ok(FeatureName::new(name)?)
            })
            .collect()
    }

    async fn load(&self, feature: &FeatureName) -> SeaOrmResult<Option<Rules>> {
        let Some(row) = self
            .db
            .query_one(statement(self.queries.rules(), [text(feature.as_str())]))
            .await?
        else {
            return Ok(None);
        };

        let document = row.try_get::<serde_json::Value>("", "rules")?;
        let rules = serde_json::from_value(document)
            .map_err(|e| SeaOrmError::corrupt(feature.as_str(), e))?;
        Ok(Some(rules))
    }

    async fn load_all(&self) -> SeaOrmResult<Breakdown> {
        let Some(row) = self
            .db
            .query_one(statement(self.queries.breakdown(), []))
            .await?
        else {
            return Ok(Breakdown::new());
        };

        let document = row.try_get::<serde_json::Value>("", "breakdown")?;
        serde_json::from_value(document).map_err(|e| SeaOrmError::corrupt("*", e))
    }

    async fn delete_all(&self) -> SeaOrmResult<()> {
        let result = self.db.execute(statement(self.queries.clear(), [])).await?;
        debug!(features = result.rows_affected(), "Cleared rule table");
        Ok(())
    }
}

#[async_trait]
impl RuleStore for SeaOrmStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn setup(&self) -> turnstile_core::Result<()> {
        Ok(self.create_table().await?)
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
        if !self.move_feature(from, to).await? {
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
    use turnstile_core::value_set;

    #[test]
    fn test_values_bind_as_json_arrays() {
        let value = json(&value_set([3, 1, 2])).unwrap();
        assert_eq!(
            value,
            Value::Json(Some(Box::new(serde_json::json!([1, 2, 3]))))
        );
    }

    #[test]
    fn test_statements_target_postgres() {
        let stmt = statement(Queries::new("t").delete(), [text("search")]);
        assert_eq!(stmt.db_backend, DbBackend::Postgres);
        assert_eq!(stmt.values.map(|v| v.0.len()), Some(1));
    }
}
