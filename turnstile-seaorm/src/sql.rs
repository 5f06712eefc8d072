//! SQL text for the rule table.
//!
//! Every statement binds names and values as parameters; only the validated
//! table name is spliced in, quoted so reserved words such as `user` work.

/// Statements for one rule table.
#[derive(Debug, Clone)]
pub struct Queries {
    table: String,
}

impl Queries {
    /// `table` is a plain or schema-qualified name, already validated.
    pub fn new(table: impl AsRef<str>) -> Self {
        Self {
            table: quote_qualified(table.as_ref()),
        }
    }

    pub fn create_table(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id BIGSERIAL PRIMARY KEY, \
             name TEXT NOT NULL UNIQUE, \
             rules JSONB NOT NULL DEFAULT '{{}}'::jsonb)",
            self.table
        )
    }

    /// `$1` name.
    pub fn insert(&self) -> String {
        format!(
            "INSERT INTO {} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
            self.table
        )
    }

    /// `$1` name.
    pub fn delete(&self) -> String {
        format!("DELETE FROM {} WHERE name = $1", self.table)
    }

    /// `$1` name, `$2` group, `$3` JSON array of values.
    ///
    /// The union runs inside the upsert, so it sees the row as locked by the
    /// conflict check.
    pub fn merge(&self) -> String {
        format!(
            "INSERT INTO {table} AS t (name, rules) \
             VALUES ($1, jsonb_build_object($2::text, $3::jsonb)) \
             ON CONFLICT (name) DO UPDATE SET rules = t.rules || jsonb_build_object(\
             $2::text, \
             (SELECT coalesce(jsonb_agg(DISTINCT e.v ORDER BY e.v), '[]'::jsonb) \
             FROM jsonb_array_elements(coalesce(t.rules -> $2::text, '[]'::jsonb) || $3::jsonb) \
             AS e(v)))",
            table = self.table
        )
    }

    /// `$1` name, `$2` group. Locks the row.
    pub fn select_entry_for_update(&self) -> String {
        format!(
            "SELECT rules -> $2::text AS entry FROM {} WHERE name = $1 FOR UPDATE",
            self.table
        )
    }

    /// `$1` name, `$2` group, `$3` JSON array of values.
    pub fn replace_entry(&self) -> String {
        format!(
            "UPDATE {} SET rules = jsonb_set(rules, ARRAY[$2::text], $3::jsonb) WHERE name = $1",
            self.table
        )
    }

    /// `$1` name, `$2` group.
    pub fn drop_entry(&self) -> String {
        format!(
            "UPDATE {} SET rules = rules - $2::text WHERE name = $1",
            self.table
        )
    }

    /// `$1` name. Locks the row.
    pub fn lock(&self) -> String {
        format!("SELECT id FROM {} WHERE name = $1 FOR UPDATE", self.table)
    }

    /// `$1` old name, `$2` new name.
    pub fn rename(&self) -> String {
        format!("UPDATE {} SET name = $2 WHERE name = $1", self.table)
    }

    /// `$1` name.
    pub fn exists(&self) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE name = $1) AS found",
            self.table
        )
    }

    /// `$1` name, `$2` group.
    pub fn exists_in_group(&self) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE name = $1 AND jsonb_exists(rules, $2::text)) AS found",
            self.table
        )
    }

    // Byte order, matching how names sort in Rust.
    pub fn names(&self) -> String {
        format!("SELECT name FROM {} ORDER BY name COLLATE \"C\"", self.table)
    }

    /// `$1` group.
    pub fn names_in_group(&self) -> String {
        format!(
            "SELECT name FROM {} WHERE jsonb_exists(rules, $1::text) ORDER BY name COLLATE \"C\"",
            self.table
        )
    }

    /// `$1` name.
    pub fn rules(&self) -> String {
        format!("SELECT rules FROM {} WHERE name = $1", self.table)
    }

    pub fn breakdown(&self) -> String {
        format!(
            "SELECT coalesce(jsonb_object_agg(name, rules), '{{}}'::jsonb) AS breakdown FROM {}",
            self.table
        )
    }

    pub fn clear(&self) -> String {
        format!("DELETE FROM {}", self.table)
    }
}

/// Quote each dotted part: `app.flags` becomes `"app"."flags"`.
fn quote_qualified(table: &str) -> String {
    table
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table() {
        let sql = Queries::new("flags").create_table();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"flags\" (id BIGSERIAL PRIMARY KEY, \
             name TEXT NOT NULL UNIQUE, rules JSONB NOT NULL DEFAULT '{}'::jsonb)"
        );
    }

    #[test]
    fn test_merge_is_a_single_upsert() {
        let sql = Queries::new("flags").merge();
        assert!(sql.starts_with("INSERT INTO \"flags\" AS t"));
        assert!(sql.contains("ON CONFLICT (name) DO UPDATE"));
        assert!(sql.contains("jsonb_agg(DISTINCT e.v ORDER BY e.v)"));
        assert!(!sql.contains(';'));
    }

    #[test]
    fn test_table_is_spliced_everywhere() {
        let queries = Queries::new("app.features");
        for sql in [
            queries.insert(),
            queries.delete(),
            queries.select_entry_for_update(),
            queries.replace_entry(),
            queries.drop_entry(),
            queries.lock(),
            queries.rename(),
            queries.exists(),
            queries.exists_in_group(),
            queries.names(),
            queries.names_in_group(),
            queries.rules(),
            queries.breakdown(),
            queries.clear(),
        ] {
            assert!(sql.contains(r#""app"."features""#), "{sql}");
        }
    }

    #[test]
    fn test_breakdown_defaults_to_empty_object() {
        assert_eq!(
            Queries::new("t").breakdown(),
            "SELECT coalesce(jsonb_object_agg(name, rules), '{}'::jsonb) AS breakdown FROM \"t\""
        );
    }

    #[test]
    fn test_reserved_word_table_is_quoted() {
        assert_eq!(Queries::new("user").clear(), r#"DELETE FROM "user""#);
        assert_eq!(
            Queries::new("public.order").delete(),
            r#"DELETE FROM "public"."order" WHERE name = $1"#
        );
    }
}
