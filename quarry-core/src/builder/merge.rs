//! MERGE query builder implementation

use super::select::table_ref;
use super::{Deferred, IntoColumns, IntoCondition, IntoRecord, IntoSubquery, QueryBuilder};
use crate::ir::{Assignment, MatchedAction, MergeQuery, TableRef, WhereCondition};
use crate::render::BuiltQuery;
use crate::{Dialect, IntoOperator, Result};

/// MERGE (upsert from a source) builder
///
/// Postgres renders native MERGE. MySQL and SQLite render an
/// `INSERT ... SELECT` upsert, which cannot express `WHEN MATCHED THEN DELETE`.
///
/// # Examples
/// ```
/// use quarry_core::{merge, QueryBuilder};
///
/// let query = merge("users AS u")
///     .using("staging AS s")
///     .on("u.id", "=", "s.id")
///     .when_matched_update_columns([("name", "s.name")])
///     .when_not_matched_insert_columns([("id", "s.id"), ("name", "s.name")]);
/// assert!(query.to_sql().unwrap().starts_with(r#"MERGE INTO "users" AS "u" USING "staging" AS "s""#));
/// ```
#[derive(Debug, Clone)]
pub struct MergeBuilder {
    query: MergeQuery,
    dialect: Dialect,
    deferred: Option<Deferred>,
}

impl MergeBuilder {
    /// Target table, optionally `"table AS alias"`
    pub fn new(into: &str) -> Self {
        let (table, alias) = match crate::sanitize::split_alias(into) {
            Some((table, alias)) => (table, Some(alias.to_string())),
            None => (into, None),
        };
        Self {
            query: MergeQuery {
                into: Some(table.to_string()),
                alias,
                ..Default::default()
            },
            dialect: Dialect::default(),
            deferred: None,
        }
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn query(&self) -> &MergeQuery {
        &self.query
    }

    /// Source table, optionally `"table AS alias"`
    pub fn using(mut self, source: &str) -> Self {
        self.query.using = Some(table_ref(source));
        self
    }

    /// Source subquery; a failure recorded on `source` surfaces at build time
    pub fn using_subquery(mut self, source: impl IntoSubquery, alias: &str) -> Self {
        match source.into_subquery() {
            Ok(query) => {
                self.query.using = Some(TableRef::Subquery {
                    query,
                    alias: Some(alias.to_string()),
                })
            }
            Err(e) => Deferred::record(&mut self.deferred, e),
        }
        self
    }

    /// Match on a column comparison between target and source
    pub fn on<O: IntoOperator>(mut self, target: &str, operator: O, source: &str) -> Self {
        self.query.on.push(WhereCondition::columns(
            target,
            operator.into_operator(),
            source,
        ));
        self
    }

    /// Match on an arbitrary condition
    pub fn on_condition<C: IntoCondition>(mut self, condition: C) -> Self {
        self.query.on.push(condition.into_condition());
        self
    }

    fn push_matched<I>(&mut self, assignments: I)
    where
        I: IntoIterator<Item = (String, Assignment)>,
    {
        let mut set = match self.query.when_matched.take() {
            Some(MatchedAction::Update(set)) => set,
            _ => Vec::new(),
        };
        set.extend(assignments);
        self.query.when_matched = Some(MatchedAction::Update(set));
    }

    /// `WHEN MATCHED THEN UPDATE SET col = value`
    pub fn when_matched_update<R: IntoRecord>(mut self, values: R) -> Self {
        self.push_matched(
            values
                .into_record()
                .into_iter()
                .map(|(column, value)| (column, Assignment::Value(value))),
        );
        self
    }

    /// `WHEN MATCHED THEN UPDATE SET col = source_col`
    pub fn when_matched_update_columns<'a, I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.push_matched(pairs.into_iter().map(|(column, source)| {
            (column.to_string(), Assignment::Column(source.to_string()))
        }));
        self
    }

    pub fn when_matched_delete(mut self) -> Self {
        self.query.when_matched = Some(MatchedAction::Delete);
        self
    }

    /// `WHEN NOT MATCHED THEN INSERT (cols) VALUES (values)`
    pub fn when_not_matched_insert<R: IntoRecord>(mut self, values: R) -> Self {
        self.query.when_not_matched.get_or_insert_with(Vec::new).extend(
            values
                .into_record()
                .into_iter()
                .map(|(column, value)| (column, Assignment::Value(value))),
        );
        self
    }

    /// `WHEN NOT MATCHED THEN INSERT (cols) VALUES (source cols)`
    pub fn when_not_matched_insert_columns<'a, I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.query.when_not_matched.get_or_insert_with(Vec::new).extend(
            pairs
                .into_iter()
                .map(|(column, source)| {
                    (column.to_string(), Assignment::Column(source.to_string()))
                }),
        );
        self
    }

    pub fn returning<C: IntoColumns>(mut self, columns: C) -> Self {
        self.query.returning.extend(columns.into_columns());
        self
    }
}

impl QueryBuilder for MergeBuilder {
    fn target_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_with(&self, dialect: Dialect) -> Result<BuiltQuery> {
        Deferred::check(&self.deferred)?;
        dialect.build_merge(&self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from, merge, Error, Filterable, Value};

    fn upsert() -> MergeBuilder {
        merge("users")
            .using("staging")
            .on("users.id", "=", "staging.id")
            .when_matched_update_columns([("name", "staging.name")])
            .when_not_matched_insert_columns([("id", "staging.id"), ("name", "staging.name")])
    }

    #[test]
    fn test_native_merge() {
        let built = merge("users AS u")
            .using("staging AS s")
            .on("id", "=", "sid")
            .when_matched_update([("active", true)])
            .when_not_matched_insert([("id", Value::from(1)), ("active", Value::from(false))])
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            r#"MERGE INTO "users" AS "u" USING "staging" AS "s" ON "id" = "sid" WHEN MATCHED THEN UPDATE SET "active" = $1 WHEN NOT MATCHED THEN INSERT ("id", "active") VALUES ($2, $3)"#
        );
        assert_eq!(
            built.params,
            vec![Value::Bool(true), Value::I32(1), Value::Bool(false)]
        );
    }

    #[test]
    fn test_merge_delete_on_postgres() {
        let sql = merge("users")
            .using("banned")
            .on("users.id", "=", "banned.user_id")
            .when_matched_delete()
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"MERGE INTO "users" USING "banned" ON "users.id" = "banned.user_id" WHEN MATCHED THEN DELETE"#
        );
    }

    #[test]
    fn test_merge_emulated_on_mysql() {
        let sql = upsert().build_with(Dialect::Mysql).unwrap().sql;
        assert_eq!(
            sql,
            "INSERT INTO `users` (`id`, `name`) SELECT `staging`.`id`, `staging`.`name` FROM `staging` \
             ON DUPLICATE KEY UPDATE `name` = `staging`.`name`"
        );
    }

    #[test]
    fn test_merge_emulated_on_sqlite() {
        let sql = upsert().build_with(Dialect::Sqlite).unwrap().sql;
        assert_eq!(
            sql,
            r#"INSERT INTO "users" ("id", "name") SELECT "id", "name" FROM "staging" WHERE true ON CONFLICT ("id") DO UPDATE SET "name" = excluded."name""#
        );
    }

    #[test]
    fn test_merge_using_subquery_params_first() {
        let source = from("imports")
            .select_raw("id, name", vec![])
            .where_(("batch", 9));
        let built = merge("users")
            .using_subquery(source, "s")
            .on("id", "=", "s.id")
            .when_not_matched_insert([("id", Value::from(1))])
            .returning("id")
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            r#"MERGE INTO "users" USING (SELECT id, name FROM "imports" WHERE "batch" = $1) AS "s" ON "id" = "s.id" WHEN NOT MATCHED THEN INSERT ("id") VALUES ($2) RETURNING "id""#
        );
        assert_eq!(built.params, vec![Value::I32(9), Value::I32(1)]);
    }

    #[test]
    fn test_merge_using_subquery_carries_deferred_error() {
        let source = from("imports").where_raw("  ", vec![]);
        let err = merge("users")
            .using_subquery(source, "s")
            .on("id", "=", "s.id")
            .when_matched_delete()
            .to_sql()
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRawSql { .. }));
    }

    #[test]
    fn test_merge_requires_when_clause() {
        let err = merge("users")
            .using("staging")
            .on("users.id", "=", "staging.id")
            .to_sql()
            .unwrap_err();
        assert!(matches!(err, Error::MissingClause { .. }));
    }

    #[test]
    fn test_merge_delete_unsupported_when_emulated() {
        let err = merge("users")
            .using("banned")
            .on("users.id", "=", "banned.user_id")
            .when_matched_delete()
            .when_not_matched_insert([("id", 1)])
            .build_with(Dialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature { .. }));
    }
}
