//! UPDATE query builder implementation

use super::{Deferred, Filterable, IntoColumns, IntoRecord, QueryBuilder};
use crate::ir::{Assignment, RawSql, UpdateQuery, WhereCondition};
use crate::render::BuiltQuery;
use crate::{Dialect, Error, Result, Value};

/// UPDATE query builder
///
/// # Examples
/// ```
/// use quarry_core::{update, Filterable, QueryBuilder};
///
/// let query = update("users")
///     .set([("name", "x")])
///     .where_(("id", 1));
/// assert_eq!(
///     query.to_sql().unwrap(),
///     r#"UPDATE "users" SET "name" = $1 WHERE "id" = $2"#
/// );
/// ```
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    query: UpdateQuery,
    dialect: Dialect,
    deferred: Option<Deferred>,
}

impl UpdateBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            query: UpdateQuery {
                table: Some(table.to_string()),
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

    pub fn query(&self) -> &UpdateQuery {
        &self.query
    }

    /// Replace the target table
    pub fn table(mut self, table: &str) -> Self {
        self.query.table = Some(table.to_string());
        self
    }

    fn assign(&mut self, column: String, value: Assignment) {
        match self.query.set.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = value,
            None => self.query.set.push((column, value)),
        }
    }

    /// Merge column values into SET; a repeated column keeps its position
    /// and takes the new value
    pub fn set<R: IntoRecord>(mut self, values: R) -> Self {
        for (column, value) in values.into_record() {
            self.assign(column, Assignment::Value(value));
        }
        self
    }

    /// Copy another column: `SET "a" = "b"`
    pub fn set_column(mut self, column: &str, source: &str) -> Self {
        self.assign(column.to_string(), Assignment::Column(source.to_string()));
        self
    }

    /// Raw SQL right-hand side with `?` markers
    pub fn set_raw(mut self, column: &str, sql: &str, params: Vec<Value>) -> Self {
        match RawSql::non_empty("SET", sql, params) {
            Ok(raw) => self.assign(column.to_string(), Assignment::Raw(raw)),
            Err(e) => Deferred::record(&mut self.deferred, e),
        }
        self
    }

    /// `SET "col" = "col" + ?`
    pub fn increment(mut self, column: &str, by: impl Into<Value>) -> Self {
        let delta = Assignment::Delta {
            subtract: false,
            by: by.into(),
        };
        self.assign(column.to_string(), delta);
        self
    }

    /// `SET "col" = "col" - ?`
    pub fn decrement(mut self, column: &str, by: impl Into<Value>) -> Self {
        let delta = Assignment::Delta {
            subtract: true,
            by: by.into(),
        };
        self.assign(column.to_string(), delta);
        self
    }

    pub fn returning<C: IntoColumns>(mut self, columns: C) -> Self {
        self.query.returning.extend(columns.into_columns());
        self
    }
}

impl Filterable for UpdateBuilder {
    fn push_where(&mut self, condition: WhereCondition) {
        self.query.where_.push(condition);
    }

    fn defer(&mut self, error: Error) {
        Deferred::record(&mut self.deferred, error);
    }
}

impl QueryBuilder for UpdateBuilder {
    fn target_dialect(&self) -> Dialect {
        self.dialect
    }

    fn build_with(&self, dialect: Dialect) -> Result<BuiltQuery> {
        Deferred::check(&self.deferred)?;
        dialect.build_update(&self.query)
    }
}
