//! DELETE query builder implementation

use super::{Deferred, Filterable, IntoColumns, QueryBuilder};
use crate::ir::{DeleteQuery, WhereCondition};
use crate::render::BuiltQuery;
use crate::{Dialect, Error, Result};

/// DELETE query builder
///
/// A WHERE clause is mandatory; building an unconditional DELETE fails.
///
/// # Examples
/// ```
/// use quarry_core::{delete, op, Filterable, QueryBuilder};
///
/// assert!(delete("users").to_sql().is_err());
///
/// let query = delete("users").where_(("age", op::LT, 18));
/// assert_eq!(query.to_sql().unwrap(), r#"DELETE FROM "users" WHERE "age" < $1"#);
/// ```
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    query: DeleteQuery,
    dialect: Dialect,
    deferred: Option<Deferred>,
}

impl DeleteBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            query: DeleteQuery {
                from: Some(table.to_string()),
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

    pub fn query(&self) -> &DeleteQuery {
        &self.query
    }

    /// Replace the target table
    pub fn from(mut self, table: &str) -> Self {
        self.query.from = Some(table.to_string());
        self
    }

    pub fn returning<C: IntoColumns>(mut self, columns: C) -> Self {
        self.query.returning.extend(columns.into_columns());
        self
    }
}

impl Filterable for DeleteBuilder {
    fn push_where(&mut self, condition: WhereCondition) {
        self.query.where_.push(condition);
    }

    fn defer(&mut self, error: Error) {
        Deferred::record(&mut self.deferred, error);
    }
}

impl QueryBuilder for DeleteBuilder {
    fn target_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_with(&self, dialect: Dialect) -> Result<BuiltQuery> {
        Deferred::check(&self.deferred)?;
        dialect.build_delete(&self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::op;
    use crate::{delete, from, Value};

    #[test]
    fn test_delete_builder() {
        let query = delete("users")
            .where_(("age", op::LT, 18))
            .or_where(("status", "inactive"));
        assert_eq!(
            query.to_sql().unwrap(),
            r#"DELETE FROM "users" WHERE "age" < $1 OR "status" = $2"#
        );
    }

    #[test]
    fn test_delete_without_where() {
        let err = delete("users").to_sql().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingClause {
                statement: "DELETE",
                ..
            }
        ));
    }

    #[test]
    fn test_delete_with_raw_where_is_enough() {
        let sql = delete("sessions")
            .where_raw("expires_at < NOW()", vec![])
            .to_sql()
            .unwrap();
        assert_eq!(sql, r#"DELETE FROM "sessions" WHERE expires_at < NOW()"#);
    }

    #[test]
    fn test_delete_not_exists_returning() {
        let orphan_check = from("users")
            .select_raw("1", vec![])
            .where_raw("users.id = posts.user_id", vec![]);
        let built = delete("posts")
            .dialect(Dialect::Sqlite)
            .where_not_exists(orphan_check)
            .returning("id")
            .build()
            .unwrap();
        assert_eq!(
            built.sql,
            r#"DELETE FROM "posts" WHERE NOT EXISTS (SELECT 1 FROM "users" WHERE users.id = posts.user_id) RETURNING "id""#
        );
        assert_eq!(built.params, Vec::<Value>::new());
    }

    #[test]
    fn test_mysql_delete() {
        let sql = delete("users")
            .dialect(Dialect::Mysql)
            .where_(("id", 1))
            .and_where(("active", false))
            .to_sql()
            .unwrap();
        assert_eq!(sql, "DELETE FROM `users` WHERE `id` = ? AND `active` = ?");
    }

    #[test]
    fn test_nested_builder_error_blocks_delete() {
        let banned = from("banned").where_raw("   ", vec![]);
        let err = delete("users")
            .where_in_subquery("id", banned)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRawSql { context: "WHERE" }));
    }

}
