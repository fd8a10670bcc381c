//! Target SQL dialects
//!
//! The set of engines is closed, so [`Dialect`] is a plain enum and every
//! dialect-specific decision is a `match` that forwards to the engine module.
//! `build_*` validate the IR, render it and return a [`BuiltQuery`].

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::builder::{DeleteBuilder, InsertBuilder, MergeBuilder, SelectBuilder, UpdateBuilder};
use crate::ir::{
    AggregateFunction, ArrayOperation, Assignment, DeleteQuery, InsertQuery, JsonOperation, MergeQuery,
    NullsOrder, SelectQuery, SortDirection, Statement, UpdateQuery, WindowFrame,
};
use crate::render::{statement, BuiltQuery, RenderContext};
use crate::validate;
use crate::{Error, Operator, Result, Value};

/// SQL engine a query is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
}

/// Generic column types, mapped to engine type names by [`Dialect::data_type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal(u8, u8),
    Text,
    Varchar(u32),
    Char(u32),
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
    Serial,
    BigSerial,
}

impl Dialect {
    /// Human-readable engine name, used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "PostgreSQL",
            Dialect::Mysql => "MySQL",
            Dialect::Sqlite => "SQLite",
        }
    }

    /// Infer the dialect from a connection URL scheme
    ///
    /// ```
    /// use quarry_core::Dialect;
    ///
    /// assert_eq!(Dialect::from_url("postgres://localhost/app").unwrap(), Dialect::Postgres);
    /// assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        scheme.parse()
    }

    // ---- Statement entry points ----

    pub fn build(&self, statement: &Statement) -> Result<BuiltQuery> {
        match statement {
            Statement::Select(q) => self.build_select(q),
            Statement::Insert(q) => self.build_insert(q),
            Statement::Update(q) => self.build_update(q),
            Statement::Delete(q) => self.build_delete(q),
            Statement::Merge(q) => self.build_merge(q),
        }
    }

    pub fn build_select(&self, query: &SelectQuery) -> Result<BuiltQuery> {
        validate::validate_select(query)?;
        self.render("SELECT", |ctx| statement::select(ctx, query))
    }

    pub fn build_insert(&self, query: &InsertQuery) -> Result<BuiltQuery> {
        validate::validate_insert(query)?;
        self.render("INSERT", |ctx| match ctx.dialect() {
            Dialect::Postgres => postgres::build_insert(ctx, query),
            Dialect::Mysql => mysql::build_insert(ctx, query),
            Dialect::Sqlite => sqlite::build_insert(ctx, query),
        })
    }

    pub fn build_update(&self, query: &UpdateQuery) -> Result<BuiltQuery> {
        validate::validate_update(query)?;
        self.render("UPDATE", |ctx| statement::update(ctx, query))
    }

    pub fn build_delete(&self, query: &DeleteQuery) -> Result<BuiltQuery> {
        validate::validate_delete(query)?;
        self.render("DELETE", |ctx| statement::delete(ctx, query))
    }

    pub fn build_merge(&self, query: &MergeQuery) -> Result<BuiltQuery> {
        validate::validate_merge(query)?;
        self.render("MERGE", |ctx| match ctx.dialect() {
            Dialect::Postgres => postgres::build_merge(ctx, query),
            Dialect::Mysql => mysql::build_merge(ctx, query),
            Dialect::Sqlite => sqlite::build_merge(ctx, query),
        })
    }

    fn render<F>(&self, kind: &'static str, f: F) -> Result<BuiltQuery>
    where
        F: FnOnce(&mut RenderContext) -> Result<String>,
    {
        let mut ctx = RenderContext::new(*self);
        let sql = f(&mut ctx)?;
        let built = ctx.finish(sql);
        tracing::debug!(
            dialect = self.name(),
            statement = kind,
            params = built.params.len(),
            "built query"
        );
        Ok(built)
    }

    // ---- Builder entry points ----

    /// Start a SELECT from `table`
    pub fn from(&self, table: &str) -> SelectBuilder {
        SelectBuilder::new().dialect(*self).from(table)
    }

    /// Start a SELECT with `columns`
    pub fn select<C: crate::builder::IntoColumns>(&self, columns: C) -> SelectBuilder {
        SelectBuilder::new().dialect(*self).columns(columns)
    }

    pub fn insert(&self, table: &str) -> InsertBuilder {
        InsertBuilder::new(table).dialect(*self)
    }

    pub fn update(&self, table: &str) -> UpdateBuilder {
        UpdateBuilder::new(table).dialect(*self)
    }

    pub fn delete(&self, table: &str) -> DeleteBuilder {
        DeleteBuilder::new(table).dialect(*self)
    }

    pub fn merge(&self, into: &str) -> MergeBuilder {
        MergeBuilder::new(into).dialect(*self)
    }

    // ---- Lexical rules ----

    /// Positional placeholder for the `n`th parameter (1-based)
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::Mysql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Type cast a placeholder needs for `value`, if any
    pub fn param_cast(&self, value: &Value) -> Option<String> {
        match self {
            Dialect::Postgres => postgres::param_cast(value),
            Dialect::Mysql | Dialect::Sqlite => None,
        }
    }

    /// Quote one token as a whole, doubling the quote character
    pub fn quote(&self, token: &str) -> String {
        match self {
            Dialect::Mysql => quote_with(token, '`'),
            Dialect::Postgres | Dialect::Sqlite => quote_with(token, '"'),
        }
    }

    /// Quote an identifier
    ///
    /// `*` is never quoted. MySQL quotes each dotted segment separately;
    /// Postgres and SQLite quote a dotted name as one token unless it ends in `.*`.
    pub fn escape_identifier(&self, name: &str) -> String {
        match self {
            Dialect::Postgres => postgres::escape_identifier(name),
            Dialect::Mysql => mysql::escape_identifier(name),
            Dialect::Sqlite => sqlite::escape_identifier(name),
        }
    }

    /// Literal SQL for a value; only for text that bypasses parameters
    pub fn escape_value(&self, value: &Value) -> String {
        match self {
            Dialect::Postgres => postgres::escape_value(value),
            Dialect::Mysql => mysql::escape_value(value),
            Dialect::Sqlite => sqlite::escape_value(value),
        }
    }

    pub fn data_type(&self, data_type: DataType) -> String {
        match self {
            Dialect::Postgres => postgres::data_type(data_type),
            Dialect::Mysql => mysql::data_type(data_type),
            Dialect::Sqlite => sqlite::data_type(data_type),
        }
    }

    /// Numeric LIMIT/OFFSET clause without a leading space; empty when neither is set
    pub fn limit_syntax(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match self {
            Dialect::Postgres => postgres::limit_syntax(limit, offset),
            Dialect::Mysql => mysql::limit_syntax(limit, offset),
            Dialect::Sqlite => sqlite::limit_syntax(limit, offset),
        }
    }

    /// Row-count sentinel for an OFFSET without LIMIT, when the engine needs one
    pub fn max_limit(&self) -> Option<&'static str> {
        match self {
            Dialect::Mysql => Some(mysql::MAX_ROWS),
            Dialect::Postgres | Dialect::Sqlite => None,
        }
    }

    pub fn begin_transaction_sql(&self) -> &'static str {
        match self {
            Dialect::Mysql => "START TRANSACTION",
            Dialect::Postgres | Dialect::Sqlite => "BEGIN",
        }
    }

    // ---- Capabilities ----

    pub fn supports_returning(&self) -> bool {
        !matches!(self, Dialect::Mysql)
    }

    pub fn supports_full_join(&self) -> bool {
        !matches!(self, Dialect::Mysql)
    }

    pub fn supports_lateral(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    pub fn supports_ordinality(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    // ---- Fragment hooks used by the shared renderers ----

    pub(crate) fn like(&self, lhs: &str, op: &Operator, rhs: &str) -> String {
        match self {
            Dialect::Postgres => format!("{lhs} {op} {rhs}"),
            Dialect::Mysql => mysql::like(lhs, op, rhs),
            Dialect::Sqlite => sqlite::like(lhs, op, rhs),
        }
    }

    pub(crate) fn json_text_path(&self, column: &str, segments: &[&str]) -> String {
        match self {
            Dialect::Postgres => postgres::json_path(column, segments, true),
            Dialect::Mysql => mysql::json_text(column, segments),
            Dialect::Sqlite => sqlite::json_extract(column, segments),
        }
    }

    pub(crate) fn json_operation(
        &self,
        ctx: &mut RenderContext,
        op: &JsonOperation,
    ) -> Result<String> {
        match self {
            Dialect::Postgres => postgres::json_operation(ctx, op),
            Dialect::Mysql => mysql::json_operation(ctx, op),
            Dialect::Sqlite => sqlite::json_operation(ctx, op),
        }
    }

    pub(crate) fn array_operation(
        &self,
        ctx: &mut RenderContext,
        op: &ArrayOperation,
    ) -> Result<String> {
        match self {
            Dialect::Postgres => postgres::array_operation(ctx, op),
            Dialect::Mysql => mysql::array_operation(ctx, op),
            Dialect::Sqlite => sqlite::array_operation(ctx, op),
        }
    }

    pub(crate) fn array_condition(&self, lhs: &str, op: &Operator, rhs: &str) -> Result<String> {
        match self {
            Dialect::Postgres => postgres::array_condition(lhs, op, rhs),
            Dialect::Mysql => mysql::array_condition(lhs, op, rhs),
            Dialect::Sqlite => sqlite::array_condition(lhs, op, rhs),
        }
    }

    pub(crate) fn aggregate(
        &self,
        ctx: &mut RenderContext,
        function: &AggregateFunction,
        column: &str,
        distinct: bool,
    ) -> Result<String> {
        let arg = if distinct {
            format!("DISTINCT {column}")
        } else {
            column.to_string()
        };
        match function {
            AggregateFunction::StringAgg(separator) => match self {
                Dialect::Postgres => {
                    let sep = ctx.add_param(Value::String(separator.clone()));
                    Ok(format!("STRING_AGG({arg}, {sep})"))
                }
                Dialect::Mysql => Ok(format!(
                    "GROUP_CONCAT({arg} SEPARATOR {})",
                    self.escape_value(&Value::String(separator.clone()))
                )),
                Dialect::Sqlite => {
                    if distinct {
                        return Err(Error::unsupported(
                            self.name(),
                            "DISTINCT with a custom separator",
                        ));
                    }
                    let sep = ctx.add_param(Value::String(separator.clone()));
                    Ok(format!("GROUP_CONCAT({arg}, {sep})"))
                }
            },
            AggregateFunction::ArrayAgg | AggregateFunction::JsonAgg => {
                let name = match (self, function) {
                    (Dialect::Postgres, AggregateFunction::ArrayAgg) => "ARRAY_AGG",
                    (Dialect::Postgres, _) => "JSON_AGG",
                    (Dialect::Mysql, _) => "JSON_ARRAYAGG",
                    (Dialect::Sqlite, _) => "JSON_GROUP_ARRAY",
                };
                Ok(format!("{name}({arg})"))
            }
            other => Ok(format!("{}({arg})", other.name())),
        }
    }

    pub(crate) fn order_entry(
        &self,
        expr: &str,
        direction: SortDirection,
        nulls: Option<NullsOrder>,
    ) -> String {
        let dir = direction.as_sql();
        match (self, nulls) {
            (_, None) => format!("{expr} {dir}"),
            // MySQL has no NULLS FIRST/LAST; sort on the null flag first
            (Dialect::Mysql, Some(NullsOrder::First)) => format!("{expr} IS NULL DESC, {expr} {dir}"),
            (Dialect::Mysql, Some(NullsOrder::Last)) => format!("{expr} IS NULL ASC, {expr} {dir}"),
            (_, Some(NullsOrder::First)) => format!("{expr} {dir} NULLS FIRST"),
            (_, Some(NullsOrder::Last)) => format!("{expr} {dir} NULLS LAST"),
        }
    }

    pub(crate) fn check_frame(&self, frame: &WindowFrame) -> Result<()> {
        if *self == Dialect::Mysql {
            if frame.units == crate::ir::FrameUnits::Groups {
                return Err(Error::unsupported(self.name(), "GROUPS window frames"));
            }
            if frame.exclude.is_some() {
                return Err(Error::unsupported(self.name(), "window frame EXCLUDE"));
            }
        }
        Ok(())
    }

    /// Set-operation member; members with ORDER BY/LIMIT are isolated
    pub(crate) fn wrap_set_member(&self, sql: String, isolate: bool) -> String {
        if !isolate {
            return sql;
        }
        match self {
            Dialect::Postgres | Dialect::Mysql => format!("({sql})"),
            Dialect::Sqlite => format!("SELECT * FROM ({sql})"),
        }
    }

    /// Reference to the value proposed for insertion into `column`
    pub(crate) fn excluded(&self, ctx: &RenderContext, column: &str) -> Result<String> {
        let quoted = ctx.ident(column)?;
        Ok(match self {
            Dialect::Postgres => format!("EXCLUDED.{quoted}"),
            Dialect::Mysql => format!("VALUES({quoted})"),
            Dialect::Sqlite => format!("excluded.{quoted}"),
        })
    }

    /// Cell for a column a multi-row INSERT record does not set
    pub(crate) fn missing_value(&self, ctx: &mut RenderContext) -> String {
        match self {
            Dialect::Postgres | Dialect::Mysql => "DEFAULT".to_string(),
            Dialect::Sqlite => ctx.add_param(Value::Null),
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            _ => Err(Error::unsupported_database(s)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn quote_with(token: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!("{quote}{}{quote}", token.replace(quote, &doubled))
}

/// Conflict update list; an empty list updates every non-target column from
/// the proposed row
pub(crate) fn conflict_assignments(
    query: &InsertQuery,
    conflict: &crate::ir::ConflictClause,
) -> Vec<(String, Assignment)> {
    if !conflict.update.is_empty() {
        return conflict.update.clone();
    }
    query
        .columns()
        .into_iter()
        .filter(|column| !conflict.target.iter().any(|t| t == column))
        .map(|column| (column.to_string(), Assignment::Excluded))
        .collect()
}

/// MERGE has no proposed row to refer to
pub(crate) fn reject_excluded(set: &[(String, Assignment)]) -> Result<()> {
    match set.iter().find(|(_, a)| *a == Assignment::Excluded) {
        Some((column, _)) => Err(Error::invalid_query(format!(
            "'{column}' uses EXCLUDED, which is only valid in ON CONFLICT updates"
        ))),
        None => Ok(()),
    }
}

/// `"a.b"` quoted whole, `a.*` as quoted qualifier plus `.*`
fn quote_whole_token(name: &str, quote: char) -> String {
    if name == "*" {
        return "*".to_string();
    }
    match name.strip_suffix(".*") {
        Some(qualifier) => format!("{}.*", quote_with(qualifier, quote)),
        None => quote_with(name, quote),
    }
}

/// Single-quoted string literal with `'` doubled
fn string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn float_literal(f: f64) -> String {
    if f.is_finite() {
        f.to_string()
    } else {
        "NULL".to_string()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `$.a.b[0]` path for the JSON function dialects
fn json_path_literal(segments: &[&str]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        if crate::sanitize::is_index_segment(segment) {
            path.push_str(&format!("[{segment}]"));
        } else {
            path.push('.');
            path.push_str(segment);
        }
    }
    string_literal(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("MariaDB".parse::<Dialect>().unwrap(), Dialect::Mysql);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedDatabaseType { .. }));
    }

    #[test]
    fn test_from_url() {
        assert_eq!(Dialect::from_url("mysql://root@localhost/db").unwrap(), Dialect::Mysql);
        assert!(Dialect::from_url("mssql://server").is_err());
    }

    #[test]
    fn test_dotted_identifier_quoting() {
        assert_eq!(Dialect::Mysql.escape_identifier("a.b"), "`a`.`b`");
        assert_eq!(Dialect::Postgres.escape_identifier("a.b"), "\"a.b\"");
        assert_eq!(Dialect::Sqlite.escape_identifier("a.b"), "\"a.b\"");
    }

    #[test]
    fn test_star_quoting() {
        assert_eq!(Dialect::Postgres.escape_identifier("*"), "*");
        assert_eq!(Dialect::Postgres.escape_identifier("users.*"), "\"users\".*");
        assert_eq!(Dialect::Mysql.escape_identifier("users.*"), "`users`.*");
    }

    #[test]
    fn test_quote_doubling() {
        assert_eq!(Dialect::Postgres.escape_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::Mysql.escape_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
    }

    #[test]
    fn test_boolean_literals() {
        assert_eq!(Dialect::Postgres.escape_value(&Value::Bool(true)), "TRUE");
        assert_eq!(Dialect::Mysql.escape_value(&Value::Bool(true)), "1");
        assert_eq!(Dialect::Mysql.escape_value(&Value::Bool(false)), "0");
        assert_eq!(Dialect::Sqlite.escape_value(&Value::Bool(false)), "FALSE");
    }

    #[test]
    fn test_limit_syntax() {
        assert_eq!(Dialect::Postgres.limit_syntax(Some(10), Some(5)), "LIMIT 10 OFFSET 5");
        assert_eq!(Dialect::Mysql.limit_syntax(Some(10), Some(5)), "LIMIT 5, 10");
        assert_eq!(
            Dialect::Mysql.limit_syntax(None, Some(5)),
            "LIMIT 5, 18446744073709551615"
        );
        assert_eq!(Dialect::Sqlite.limit_syntax(Some(10), Some(5)), "LIMIT 10 OFFSET 5");
        assert_eq!(Dialect::Sqlite.limit_syntax(None, None), "");
    }

    #[test]
    fn test_data_types() {
        assert_eq!(Dialect::Postgres.data_type(DataType::Json), "JSONB");
        assert_eq!(Dialect::Mysql.data_type(DataType::Boolean), "TINYINT(1)");
        assert_eq!(Dialect::Sqlite.data_type(DataType::Uuid), "TEXT");
        assert_eq!(Dialect::Postgres.data_type(DataType::Decimal(10, 2)), "NUMERIC(10, 2)");
    }

    #[test]
    fn test_json_path_literal() {
        assert_eq!(json_path_literal(&["a", "0", "b"]), "'$.a[0].b'");
    }

    #[test]
    fn test_default_dialect() {
        assert_eq!(Dialect::default(), Dialect::Postgres);
        assert_eq!(Dialect::Sqlite.to_string(), "SQLite");
    }
}
