//! sqlx-backed connections
//!
//! Uses `sqlx::AnyConnection`, so one connector serves every engine whose
//! cargo feature (`postgres`, `mysql`, `sqlite`) is enabled.

use crate::config::PoolConfig;
use crate::dialect::postgres;
use crate::executor::{Connection, Field, QueryResult, Row};
use crate::pool::{Connect, Pool};
use crate::{Dialect, Result, Value};
use futures::TryStreamExt;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::AnyConnection;
use sqlx::query::Query;
use sqlx::{Any, Column, Connection as _, Either, Row as _, TypeInfo, ValueRef};

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Opens `AnyConnection`s to one database URL
#[derive(Debug, Clone)]
pub struct SqlxConnector {
    url: String,
    dialect: Dialect,
}

impl SqlxConnector {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let config = PoolConfig::new(url);
        let dialect = config.dialect()?;
        sqlx::any::install_default_drivers();
        Ok(Self {
            url: config.url,
            dialect,
        })
    }
}

impl Connect for SqlxConnector {
    type Connection = SqlxConnection;

    async fn connect(&self) -> Result<SqlxConnection> {
        let inner = AnyConnection::connect(&self.url).await?;
        tracing::debug!(dialect = %self.dialect, "connected");
        Ok(SqlxConnection {
            inner,
            dialect: self.dialect,
        })
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl Pool<SqlxConnector> {
    /// Pool over `config.url`; connections open on first use
    pub fn connect_lazy(config: &PoolConfig) -> Result<Self> {
        let connector = SqlxConnector::new(config.url.clone())?;
        Pool::from_config(connector, config)
    }
}

/// One open database connection
pub struct SqlxConnection {
    inner: AnyConnection,
    dialect: Dialect,
}

impl Connection for SqlxConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let dialect = self.dialect;
        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, value| bind_value(query, value, dialect));

        let mut result = QueryResult::default();
        let mut affected = 0;
        let mut stream = query.fetch_many(&mut self.inner);
        while let Some(step) = stream.try_next().await? {
            match step {
                Either::Left(done) => affected += done.rows_affected(),
                Either::Right(row) => {
                    if result.fields.is_empty() {
                        result.fields = fields(&row);
                    }
                    result.rows.push(decode_row(&row)?);
                }
            }
        }

        result.row_count = if result.rows.is_empty() {
            affected
        } else {
            result.rows.len() as u64
        };
        Ok(result)
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn close(self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

/// The Any driver has no JSON or array types, so both bind as text
///
/// Postgres placeholders carry a `::jsonb` or `::type[]` cast, which needs
/// arrays in `{...}` input syntax. The other engines read JSON text.
fn bind_value<'q>(query: AnyQuery<'q>, value: &Value, dialect: Dialect) -> AnyQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::I32(i) => query.bind(*i),
        Value::I64(i) => query.bind(*i),
        Value::F32(f) => query.bind(*f),
        Value::F64(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Json(j) => query.bind(j.to_string()),
        Value::Array(items) if dialect == Dialect::Postgres => {
            query.bind(postgres::array_literal(items))
        }
        Value::Array(_) => query.bind(value.to_json().to_string()),
    }
}

fn fields(row: &AnyRow) -> Vec<Field> {
    row.columns()
        .iter()
        .map(|column| Field {
            name: column.name().to_string(),
            type_name: column.type_info().name().to_string(),
        })
        .collect()
}

fn decode_row(row: &AnyRow) -> Result<Row> {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_cell(row, index)?);
    }
    Ok(out)
}

fn decode_cell(row: &AnyRow, index: usize) -> Result<serde_json::Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(serde_json::Value::Null);
    }
    if let Ok(b) = row.try_get::<bool, _>(index) {
        return Ok(b.into());
    }
    if let Ok(i) = row.try_get::<i64, _>(index) {
        return Ok(i.into());
    }
    if let Ok(f) = row.try_get::<f64, _>(index) {
        return Ok(serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null));
    }
    if let Ok(s) = row.try_get::<String, _>(index) {
        return Ok(s.into());
    }
    let bytes = row.try_get::<Vec<u8>, _>(index)?;
    Ok(Value::Bytes(bytes).to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_connector_rejects_unknown_scheme() {
        let err = SqlxConnector::new("oracle://db/app").unwrap_err();
        assert!(matches!(err, Error::UnsupportedDatabaseType { .. }));
    }

    #[test]
    fn test_connector_dialect_from_url() {
        let connector = SqlxConnector::new("postgresql://localhost/app").unwrap();
        assert_eq!(connector.dialect(), Dialect::Postgres);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_round_trip() {
        use crate::{from, insert, update, ConnectionManager, Executable, Filterable};
        use serde::Deserialize;

        #[derive(Debug, Deserialize, PartialEq)]
        struct User {
            id: i64,
            name: String,
            score: Option<f64>,
        }

        // one connection so the in-memory database survives between statements
        let config = PoolConfig::new("sqlite::memory:").max_connections(1);
        let pool = Pool::connect_lazy(&config).unwrap();

        let mut conn = pool.get_connection().await.unwrap();
        conn.query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL)",
            &[],
        )
        .await
        .unwrap();
        pool.release_connection(conn).await;

        let inserted = insert("users")
            .values_many(vec![
                vec![("id", Value::from(1)), ("name", Value::from("Ada"))],
                vec![
                    ("id", Value::from(2)),
                    ("name", Value::from("Linus")),
                    ("score", Value::from(9.5)),
                ],
            ])
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(inserted.row_count, 2);

        let updated = update("users")
            .set([("name", "Grace")])
            .where_(("id", 1))
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(updated.row_count, 1);

        let users: Vec<User> = from("users")
            .columns(["id", "name", "score"])
            .order_by_desc("id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(
            users,
            vec![
                User {
                    id: 2,
                    name: "Linus".into(),
                    score: Some(9.5)
                },
                User {
                    id: 1,
                    name: "Grace".into(),
                    score: None
                },
            ]
        );
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_array_operators_bind_json_text() {
        use crate::{from, insert, op, ConnectionManager, Executable};
        use serde::Deserialize;

        #[derive(Debug, Deserialize, PartialEq)]
        struct Post {
            id: i64,
        }

        let config = PoolConfig::new("sqlite::memory:").max_connections(1);
        let pool = Pool::connect_lazy(&config).unwrap();
        let mut conn = pool.get_connection().await.unwrap();
        conn.query("CREATE TABLE posts (id INTEGER PRIMARY KEY, tags TEXT NOT NULL)", &[])
            .await
            .unwrap();
        pool.release_connection(conn).await;

        insert("posts")
            .values_many(vec![
                vec![("id", Value::from(1)), ("tags", Value::from(vec!["rust", "sql"]))],
                vec![("id", Value::from(2)), ("tags", Value::from(vec!["go"]))],
            ])
            .execute(&pool)
            .await
            .unwrap();

        let posts: Vec<Post> = from("posts")
            .columns(["id"])
            .where_array("tags", op::CONTAINS, vec!["rust"])
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(posts, vec![Post { id: 1 }]);
    }

    /// Run with `DATABASE_URL=postgres://... cargo test --features postgres -- --ignored`
    #[cfg(feature = "postgres")]
    #[tokio::test]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_postgres_array_and_jsonb_binding() {
        use crate::{from, insert, op, ConnectionManager, Executable};
        use serde::Deserialize;

        #[derive(Debug, Deserialize, PartialEq)]
        struct Post {
            id: i64,
            unpublished: bool,
        }

        // temporary tables live on one connection
        let config = PoolConfig::from_env().unwrap().max_connections(1);
        let pool = Pool::connect_lazy(&config).unwrap();
        let mut conn = pool.get_connection().await.unwrap();
        conn.query(
            "CREATE TEMPORARY TABLE posts (id INT8 PRIMARY KEY, tags TEXT[] NOT NULL, meta JSONB NOT NULL)",
            &[],
        )
        .await
        .unwrap();
        pool.release_connection(conn).await;

        insert("posts")
            .values_many(vec![
                vec![
                    ("id", Value::from(1i64)),
                    ("tags", Value::from(vec!["rust", "sql \"quoted\""])),
                    ("meta", Value::from(serde_json::json!({"draft": true}))),
                ],
                vec![
                    ("id", Value::from(2i64)),
                    ("tags", Value::from(vec!["go"])),
                    ("meta", Value::from(serde_json::json!({"draft": false}))),
                ],
            ])
            .execute(&pool)
            .await
            .unwrap();

        let posts: Vec<Post> = from("posts")
            .columns(["id"])
            .json_contains("meta", serde_json::json!({"draft": true}), "unpublished")
            .where_array("tags", op::OVERLAPS, vec!["sql \"quoted\"", "haskell"])
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(
            posts,
            vec![Post {
                id: 1,
                unpublished: true
            }]
        );
    }

    #[test]
    fn test_postgres_arrays_bind_in_array_syntax() {
        let items = vec![Value::from("a,b"), Value::Null];
        assert_eq!(postgres::array_literal(&items), r#"{"a,b",NULL}"#);
    }

}
