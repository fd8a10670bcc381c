//! Fluent query builders
//!
//! Every builder owns one IR value and a [`Dialect`]. Chained calls mutate
//! the IR and hand the builder back; [`QueryBuilder`] validates and renders
//! the current IR each time it is asked for SQL.

pub mod delete;
pub mod insert;
pub mod merge;
pub mod select;
pub mod update;

pub use delete::DeleteBuilder;
pub use insert::InsertBuilder;
pub use merge::MergeBuilder;
pub use select::SelectBuilder;
pub use update::UpdateBuilder;

use std::collections::{BTreeMap, HashMap};

use crate::ir::{Operand, RawSql, Record, SelectQuery, Subquery, WhereCondition};
use crate::render::BuiltQuery;
use crate::{Dialect, Error, IntoOperator, Operator, Result, Value};

/// Core trait for all query builders
pub trait QueryBuilder {
    /// Dialect this builder renders for by default
    fn target_dialect(&self) -> Dialect;

    /// Validate and render the current IR for `dialect`
    fn build_with(&self, dialect: Dialect) -> Result<BuiltQuery>;

    fn build(&self) -> Result<BuiltQuery> {
        self.build_with(self.target_dialect())
    }

    /// Generate the SQL query string
    fn to_sql(&self) -> Result<String> {
        Ok(self.build()?.sql)
    }

    /// Get the parameters for the query
    fn to_params(&self) -> Result<Vec<Value>> {
        Ok(self.build()?.params)
    }

    /// SQL with parameters inlined as literals; for logs, never for execution
    fn to_string_inlined(&self) -> Result<String> {
        let dialect = self.target_dialect();
        Ok(self.build_with(dialect)?.to_string_inlined(dialect))
    }
}

/// First failure of a chained call, raised when the builder is built
///
/// Builders stay `Clone`, so the failure is kept in a cloneable form.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Deferred {
    EmptyRawSql(&'static str),
    Invalid(String),
}

impl Deferred {
    pub(crate) fn record(slot: &mut Option<Deferred>, error: Error) {
        if slot.is_some() {
            return;
        }
        *slot = Some(match error {
            Error::EmptyRawSql { context } => Deferred::EmptyRawSql(context),
            Error::InvalidQuery { message } => Deferred::Invalid(message),
            other => Deferred::Invalid(other.to_string()),
        });
    }

    pub(crate) fn check(slot: &Option<Deferred>) -> Result<()> {
        match slot {
            None => Ok(()),
            Some(Deferred::EmptyRawSql(context)) => Err(Error::EmptyRawSql { context }),
            Some(Deferred::Invalid(message)) => Err(Error::invalid_query(message.clone())),
        }
    }
}

/// Sources for a nested query
///
/// A builder passed as a subquery hands over the first failure it recorded,
/// so the outer statement fails to build instead of losing the fragment.
pub trait IntoSubquery {
    fn into_subquery(self) -> Result<Subquery>;
}

impl IntoSubquery for Subquery {
    fn into_subquery(self) -> Result<Subquery> {
        Ok(self)
    }
}

impl IntoSubquery for SelectQuery {
    fn into_subquery(self) -> Result<Subquery> {
        Ok(self.into())
    }
}

/// Trait for conditions that can be used in WHERE clauses
pub trait IntoCondition {
    fn into_condition(self) -> WhereCondition;
}

// Shorthand equality: where_(("age", 18))
impl<T> IntoCondition for (&str, T)
where
    T: Into<Value>,
{
    fn into_condition(self) -> WhereCondition {
        WhereCondition::eq(self.0, self.1)
    }
}

// Explicit operators: where_(("age", op::GT, 18)) or where_(("age", ">", 18))
impl<T, O> IntoCondition for (&str, O, T)
where
    T: Into<Value>,
    O: IntoOperator,
{
    fn into_condition(self) -> WhereCondition {
        let operator = self.1.into_operator();
        let value = if operator.is_null_check() {
            Operand::None
        } else {
            Operand::Value(self.2.into())
        };
        WhereCondition::new(self.0, operator, value)
    }
}

impl IntoCondition for WhereCondition {
    fn into_condition(self) -> WhereCondition {
        self
    }
}

/// Trait for types that can be converted to column lists
pub trait IntoColumns {
    fn into_columns(self) -> Vec<String>;
}

impl IntoColumns for &str {
    fn into_columns(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoColumns for String {
    fn into_columns(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoColumns for Vec<&str> {
    fn into_columns(self) -> Vec<String> {
        self.into_iter().map(|s| s.to_string()).collect()
    }
}

impl IntoColumns for Vec<String> {
    fn into_columns(self) -> Vec<String> {
        self
    }
}

impl<const N: usize> IntoColumns for [&str; N] {
    fn into_columns(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl IntoColumns for (&str, &str) {
    fn into_columns(self) -> Vec<String> {
        vec![self.0.to_string(), self.1.to_string()]
    }
}

impl IntoColumns for (&str, &str, &str) {
    fn into_columns(self) -> Vec<String> {
        vec![self.0.to_string(), self.1.to_string(), self.2.to_string()]
    }
}

impl IntoColumns for (&str, &str, &str, &str) {
    fn into_columns(self) -> Vec<String> {
        vec![
            self.0.to_string(),
            self.1.to_string(),
            self.2.to_string(),
            self.3.to_string(),
        ]
    }
}

/// Trait for types that can be converted to one INSERT/UPDATE record
///
/// Ordered inputs keep their order. `HashMap` input is sorted by column name
/// so the rendered SQL is stable.
pub trait IntoRecord {
    fn into_record(self) -> Record;
}

impl IntoRecord for Record {
    fn into_record(self) -> Record {
        self
    }
}

impl<V: Into<Value>> IntoRecord for Vec<(&str, V)> {
    fn into_record(self) -> Record {
        self.into_iter()
            .map(|(column, value)| (column.to_string(), value.into()))
            .collect()
    }
}

impl<V: Into<Value>, const N: usize> IntoRecord for [(&str, V); N] {
    fn into_record(self) -> Record {
        self.into_iter()
            .map(|(column, value)| (column.to_string(), value.into()))
            .collect()
    }
}

impl<V: Into<Value>> IntoRecord for BTreeMap<String, V> {
    fn into_record(self) -> Record {
        self.into_iter()
            .map(|(column, value)| (column, value.into()))
            .collect()
    }
}

impl<V: Into<Value>> IntoRecord for HashMap<String, V> {
    fn into_record(self) -> Record {
        let mut record: Record = self
            .into_iter()
            .map(|(column, value)| (column, value.into()))
            .collect();
        record.sort_by(|a, b| a.0.cmp(&b.0));
        record
    }
}

/// WHERE methods shared by the SELECT, UPDATE and DELETE builders
pub trait Filterable: Sized {
    #[doc(hidden)]
    fn push_where(&mut self, condition: WhereCondition);

    #[doc(hidden)]
    fn defer(&mut self, error: Error);

    /// Add a WHERE condition
    ///
    /// # Examples
    /// ```
    /// use quarry_core::{from, op, Filterable, QueryBuilder};
    ///
    /// let query = from("users")
    ///     .where_(("age", op::GT, 18))
    ///     .where_(("name", "John"));
    /// assert_eq!(
    ///     query.to_sql().unwrap(),
    ///     r#"SELECT * FROM "users" WHERE "age" > $1 AND "name" = $2"#
    /// );
    /// ```
    fn where_<C: IntoCondition>(mut self, condition: C) -> Self {
        self.push_where(condition.into_condition());
        self
    }

    /// Add a WHERE condition preceded by OR
    fn or_where<C: IntoCondition>(mut self, condition: C) -> Self {
        self.push_where(condition.into_condition().or());
        self
    }

    /// Add an AND WHERE condition (same as where_)
    fn and_where<C: IntoCondition>(self, condition: C) -> Self {
        self.where_(condition)
    }

    fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.push_where(WhereCondition::new(column, Operator::IN, Value::Array(values)));
        self
    }

    fn where_not_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.push_where(WhereCondition::new(column, Operator::NOT_IN, Value::Array(values)));
        self
    }

    fn where_between(mut self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let pair = Value::Array(vec![low.into(), high.into()]);
        self.push_where(WhereCondition::new(column, Operator::BETWEEN, pair));
        self
    }

    fn where_null(mut self, column: &str) -> Self {
        self.push_where(WhereCondition::null_check(column, false));
        self
    }

    fn where_not_null(mut self, column: &str) -> Self {
        self.push_where(WhereCondition::null_check(column, true));
        self
    }

    /// LIKE with a pattern whose `%` and `_` are meant as wildcards
    fn where_like(mut self, column: &str, pattern: &str) -> Self {
        self.push_where(WhereCondition::new(
            column,
            Operator::LIKE,
            Operand::Pattern(pattern.to_string()),
        ));
        self
    }

    fn where_exists(self, subquery: impl IntoSubquery) -> Self {
        self.where_subquery(subquery, |query| WhereCondition::exists(query, false))
    }

    fn where_not_exists(self, subquery: impl IntoSubquery) -> Self {
        self.where_subquery(subquery, |query| WhereCondition::exists(query, true))
    }

    /// `column IN (subquery)`
    fn where_in_subquery(self, column: &str, subquery: impl IntoSubquery) -> Self {
        self.where_subquery(subquery, |query| {
            WhereCondition::new(column, Operator::IN, Operand::Subquery(query))
        })
    }

    #[doc(hidden)]
    fn where_subquery<F>(mut self, subquery: impl IntoSubquery, condition: F) -> Self
    where
        F: FnOnce(Subquery) -> WhereCondition,
    {
        match subquery.into_subquery() {
            Ok(query) => self.push_where(condition(query)),
            Err(e) => self.defer(e),
        }
        self
    }

    /// Compare two columns; the right side is quoted, not bound
    fn where_column<O: IntoOperator>(mut self, left: &str, operator: O, right: &str) -> Self {
        self.push_where(WhereCondition::columns(left, operator.into_operator(), right));
        self
    }

    /// Compare the JSON text at `path` inside `column`
    fn where_json_path<O: IntoOperator>(
        mut self,
        column: &str,
        path: &str,
        operator: O,
        value: impl Into<Value>,
    ) -> Self {
        self.push_where(
            WhereCondition::new(column, operator.into_operator(), value.into()).with_json_path(path),
        );
        self
    }

    /// Raw SQL condition with `?` markers, never escaped
    fn where_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
        match RawSql::non_empty("WHERE", sql, params) {
            Ok(raw) => self.push_where(WhereCondition::raw(raw.sql, raw.params)),
            Err(e) => self.defer(e),
        }
        self
    }

    fn or_where_raw(mut self, sql: &str, params: Vec<Value>) -> Self {
        match RawSql::non_empty("WHERE", sql, params) {
            Ok(raw) => self.push_where(WhereCondition::raw(raw.sql, raw.params).or()),
            Err(e) => self.defer(e),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::op;

    #[test]
    fn test_condition_trait_implementations() {
        // Shorthand equality
        let cond = ("age", 18).into_condition();
        assert_eq!(cond.column, "age");
        assert_eq!(cond.operator, Operator::EQ);
        assert_eq!(cond.value, Operand::Value(Value::I32(18)));

        // Explicit operator
        let cond = ("age", op::GT, 18).into_condition();
        assert_eq!(cond.operator, Operator::GT);

        // String operator
        let cond = ("name", "like", "%john%").into_condition();
        assert_eq!(cond.operator, Operator::LIKE);
        assert_eq!(cond.value, Operand::Value(Value::from("%john%")));

        // Null checks drop the value
        let cond = ("deleted_at", "IS NULL", ()).into_condition();
        assert!(cond.value.is_none());
    }

    #[test]
    fn test_into_columns_implementations() {
        assert_eq!("id".into_columns(), vec!["id"]);
        assert_eq!(["a", "b"].into_columns(), vec!["a", "b"]);
        assert_eq!(("a", "b", "c").into_columns(), vec!["a", "b", "c"]);
        assert_eq!(vec!["x".to_string()].into_columns(), vec!["x"]);
    }

    #[test]
    fn test_into_record_keeps_order() {
        let record = vec![("name", Value::from("a")), ("age", Value::from(3))].into_record();
        assert_eq!(record[0].0, "name");
        assert_eq!(record[1].0, "age");

        let mut map = HashMap::new();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        let record = map.into_record();
        assert_eq!(record, vec![("a".into(), Value::I32(1)), ("b".into(), Value::I32(2))]);
    }

    #[test]
    fn test_deferred_invalid_query_round_trips() {
        let mut slot = None;
        Deferred::record(&mut slot, Error::invalid_query("bad window"));
        let err = Deferred::check(&slot).unwrap_err();

        let mut outer = None;
        Deferred::record(&mut outer, err);
        assert_eq!(outer, Some(Deferred::Invalid("bad window".into())));
    }

    #[test]
    fn test_deferred_keeps_first_error() {
        let mut slot = None;
        Deferred::record(&mut slot, Error::EmptyRawSql { context: "WHERE" });
        Deferred::record(&mut slot, Error::invalid_query("later"));
        assert!(matches!(
            Deferred::check(&slot).unwrap_err(),
            Error::EmptyRawSql { context: "WHERE" }
        ));
    }
}
