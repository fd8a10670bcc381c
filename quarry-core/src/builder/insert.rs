//! INSERT query builder implementation

use super::{Deferred, IntoColumns, IntoCondition, IntoRecord, QueryBuilder};
use crate::ir::{Assignment, ConflictAction, ConflictClause, InsertQuery};
use crate::render::BuiltQuery;
use crate::{Dialect, Error, Result};

/// INSERT query builder
///
/// # Examples
/// ```
/// use quarry_core::{insert, QueryBuilder};
///
/// let query = insert("users")
///     .values([("name", "Ada"), ("email", "ada@example.com")])
///     .on_conflict(["email"])
///     .merge_columns(["name"])
///     .returning("id");
/// assert_eq!(
///     query.to_sql().unwrap(),
///     r#"INSERT INTO "users" ("name", "email") VALUES ($1, $2) ON CONFLICT ("email") DO UPDATE SET "name" = EXCLUDED."name" RETURNING "id""#
/// );
/// ```
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    query: InsertQuery,
    dialect: Dialect,
    deferred: Option<Deferred>,
}

impl InsertBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            query: InsertQuery {
                into: Some(table.to_string()),
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

    pub fn query(&self) -> &InsertQuery {
        &self.query
    }

    /// Replace the target table
    pub fn into_table(mut self, table: &str) -> Self {
        self.query.into = Some(table.to_string());
        self
    }

    /// Add one row
    pub fn values<R: IntoRecord>(mut self, record: R) -> Self {
        self.query.values.push(record.into_record());
        self
    }

    /// Add several rows; columns are the union of all record keys
    pub fn values_many<I, R>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoRecord,
    {
        self.query
            .values
            .extend(records.into_iter().map(IntoRecord::into_record));
        self
    }

    pub fn returning<C: IntoColumns>(mut self, columns: C) -> Self {
        self.query.returning.extend(columns.into_columns());
        self
    }

    /// Start conflict handling on `target`; defaults to DO NOTHING
    pub fn on_conflict<C: IntoColumns>(mut self, target: C) -> Self {
        self.query.conflict = Some(ConflictClause::new(target.into_columns()));
        self
    }

    fn conflict_mut(&mut self) -> Option<&mut ConflictClause> {
        if self.query.conflict.is_none() {
            Deferred::record(
                &mut self.deferred,
                Error::invalid_query("conflict action requires on_conflict() first"),
            );
        }
        self.query.conflict.as_mut()
    }

    pub fn do_nothing(mut self) -> Self {
        if let Some(conflict) = self.conflict_mut() {
            conflict.action = ConflictAction::DoNothing;
            conflict.update.clear();
        }
        self
    }

    /// DO UPDATE with explicit values
    pub fn do_update<R: IntoRecord>(mut self, values: R) -> Self {
        if let Some(conflict) = self.conflict_mut() {
            conflict.action = ConflictAction::DoUpdate;
            conflict.update.extend(
                values
                    .into_record()
                    .into_iter()
                    .map(|(column, value)| (column, Assignment::Value(value))),
            );
        }
        self
    }

    /// DO UPDATE taking the proposed value for each column; an empty list
    /// updates every inserted column outside the target
    pub fn merge_columns<C: IntoColumns>(mut self, columns: C) -> Self {
        if let Some(conflict) = self.conflict_mut() {
            conflict.action = ConflictAction::DoUpdate;
            conflict.update.extend(
                columns
                    .into_columns()
                    .into_iter()
                    .map(|column| (column, Assignment::Excluded)),
            );
        }
        self
    }

    /// Restrict the conflict update with a condition
    pub fn conflict_where<C: IntoCondition>(mut self, condition: C) -> Self {
        if let Some(conflict) = self.conflict_mut() {
            conflict.where_.push(condition.into_condition());
        }
        self
    }
}

impl QueryBuilder for InsertBuilder {
    fn target_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_with(&self, dialect: Dialect) -> Result<BuiltQuery> {
        Deferred::check(&self.deferred)?;
        dialect.build_insert(&self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{insert, Value};
    use std::collections::HashMap;

    #[test]
    fn test_insert_builder() {
        let built = insert("users")
            .values([("name", Value::from("John")), ("age", Value::from(30))])
            .build()
            .unwrap();
        assert_eq!(built.sql, r#"INSERT INTO "users" ("name", "age") VALUES ($1, $2)"#);
        assert_eq!(built.params, vec![Value::from("John"), Value::I32(30)]);
    }

    #[test]
    fn test_insert_many_with_gaps() {
        let built = insert("users")
            .dialect(Dialect::Sqlite)
            .values_many(vec![
                vec![("name", Value::from("a")), ("age", Value::from(1))],
                vec![("name", Value::from("b"))],
            ])
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            r#"INSERT INTO "users" ("name", "age") VALUES (?, ?), (?, ?)"#
        );
        assert_eq!(built.params[3], Value::Null);
    }

    #[test]
    fn test_insert_from_hashmap() {
        let mut data = HashMap::new();
        data.insert("name".to_string(), Value::from("John"));
        data.insert("age".to_string(), Value::from(30));
        let sql = insert("users").values(data).to_sql().unwrap();
        assert_eq!(sql, r#"INSERT INTO "users" ("age", "name") VALUES ($1, $2)"#);
    }

    #[test]
    fn test_insert_empty_data_fails() {
        let err = insert("users").to_sql().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingClause {
                statement: "INSERT",
                ..
            }
        ));
    }

    #[test]
    fn test_conflict_action_without_target_is_deferred() {
        let err = insert("users")
            .values([("id", 1)])
            .do_nothing()
            .to_sql()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn test_on_conflict_do_nothing_per_dialect() {
        let query = insert("users").values([("id", 1)]).on_conflict("id").do_nothing();
        assert_eq!(
            query.to_sql().unwrap(),
            r#"INSERT INTO "users" ("id") VALUES ($1) ON CONFLICT ("id") DO NOTHING"#
        );
        assert_eq!(
            query.build_with(Dialect::Mysql).unwrap().sql,
            "INSERT IGNORE INTO `users` (`id`) VALUES (?)"
        );
    }

    #[test]
    fn test_do_update_with_where() {
        let built = insert("counters")
            .values([("key", Value::from("hits")), ("n", Value::from(1))])
            .on_conflict("key")
            .do_update([("n", 0)])
            .conflict_where(("locked", false))
            .build_with(Dialect::Sqlite)
            .unwrap();
        assert_eq!(
            built.sql,
            r#"INSERT INTO "counters" ("key", "n") VALUES (?, ?) ON CONFLICT ("key") DO UPDATE SET "n" = ? WHERE "locked" = ?"#
        );
        assert_eq!(built.params.len(), 4);
    }

    #[test]
    fn test_merge_all_columns() {
        let sql = insert("users")
            .values([("email", "a@b.c"), ("name", "A")])
            .on_conflict("email")
            .merge_columns(Vec::<String>::new())
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "users" ("email", "name") VALUES ($1, $2) ON CONFLICT ("email") DO UPDATE SET "name" = EXCLUDED."name""#
        );
    }
}
