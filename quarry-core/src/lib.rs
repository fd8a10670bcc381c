//! Quarry Core - a fluent SQL query builder for Postgres, MySQL and SQLite
//!
//! Builders assemble a dialect-independent query IR. Building validates the IR
//! and renders it for one [`Dialect`] into SQL text plus positional
//! parameters ([`BuiltQuery`]). Execution is optional and goes through the
//! [`ConnectionManager`] contract, implemented by [`Pool`].
//!
//! ```
//! use quarry_core::{from, op, Dialect, Filterable, QueryBuilder};
//!
//! let query = from("users")
//!     .columns(["id", "name"])
//!     .where_(("age", op::GT, 18))
//!     .limit(10);
//!
//! assert_eq!(
//!     query.to_sql().unwrap(),
//!     r#"SELECT "id", "name" FROM "users" WHERE "age" > $1 LIMIT 10"#
//! );
//! assert_eq!(
//!     query.build_with(Dialect::Mysql).unwrap().sql,
//!     "SELECT `id`, `name` FROM `users` WHERE `age` > ? LIMIT 10"
//! );
//! ```

pub mod builder;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod executor;
pub mod ir;
pub mod operator;
pub mod pool;
pub mod render;
pub mod sanitize;
pub mod validate;
pub mod value;

pub use builder::{
    DeleteBuilder, Filterable, InsertBuilder, IntoColumns, IntoCondition, IntoRecord, IntoSubquery,
    MergeBuilder, QueryBuilder, SelectBuilder, UpdateBuilder,
};
pub use config::PoolConfig;
pub use dialect::{DataType, Dialect};
pub use driver::{SqlxConnection, SqlxConnector};
pub use error::{Error, Result};
pub use executor::{
    transaction, Connection, ConnectionManager, Executable, Field, QueryResult, Row,
};
pub use ir::{
    AggregateFunction, JoinType, NullsOrder, SortDirection, WhereCondition, WindowFunction,
};
pub use operator::{op, IntoOperator, Operator};
pub use pool::{Connect, Pool, PooledConnection};
pub use render::BuiltQuery;
pub use value::Value;

/// Start a SELECT from `table` (`"table"` or `"table AS alias"`)
pub fn from(table: &str) -> SelectBuilder {
    Dialect::default().from(table)
}

/// Start a SELECT with a column list; add the source with `.from(..)`
pub fn select<C: IntoColumns>(columns: C) -> SelectBuilder {
    Dialect::default().select(columns)
}

pub fn insert(table: &str) -> InsertBuilder {
    Dialect::default().insert(table)
}

pub fn update(table: &str) -> UpdateBuilder {
    Dialect::default().update(table)
}

/// Start a DELETE; building fails until a WHERE condition is added
pub fn delete(table: &str) -> DeleteBuilder {
    Dialect::default().delete(table)
}

pub fn merge(into: &str) -> MergeBuilder {
    Dialect::default().merge(into)
}
