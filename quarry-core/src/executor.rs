//! Connection contracts, transactions and query execution

use crate::{Dialect, QueryBuilder, Result, Value};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

/// One result row keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Column metadata reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub type_name: String,
}

/// Everything a single statement produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Rows affected for writes, rows returned for reads
    pub row_count: u64,
    pub fields: Vec<Field>,
}

impl QueryResult {
    /// Deserialize every row into `T`
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.rows
            .into_iter()
            .map(|row| Ok(serde_json::from_value(serde_json::Value::Object(row))?))
            .collect()
    }

    /// Deserialize the first row, if any
    pub fn first<T: DeserializeOwned>(self) -> Result<Option<T>> {
        match self.rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(serde_json::Value::Object(row))?)),
            None => Ok(None),
        }
    }
}

/// A live database connection
pub trait Connection: Send {
    /// Run one statement with positional parameters
    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<QueryResult>> + Send;

    /// Dialect the server behind this connection speaks
    fn dialect(&self) -> Dialect;

    /// Close the underlying connection
    fn close(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;
}

/// Source of connections plus the dialect they speak
pub trait ConnectionManager: Send + Sync {
    type Connection: Connection;

    /// Check out a connection; may suspend until one is available
    fn get_connection(&self) -> impl Future<Output = Result<Self::Connection>> + Send;

    /// Hand a connection back
    fn release_connection(&self, connection: Self::Connection) -> impl Future<Output = ()> + Send;

    fn dialect(&self) -> Dialect;
}

async fn rollback<C: Connection>(connection: &mut C) {
    if let Err(error) = connection.query("ROLLBACK", &[]).await {
        tracing::warn!(%error, "rollback failed");
    }
}

/// Run `f` inside a transaction on one checked-out connection
///
/// Commits when `f` succeeds; rolls back and returns the error otherwise.
/// The connection is released in both cases. Statements run through
/// [`Executable::execute_on`] render in the connection's dialect.
///
/// ```no_run
/// # async fn demo<M: quarry_core::ConnectionManager>(manager: &M) -> quarry_core::Result<()> {
/// use futures::FutureExt;
/// use quarry_core::{transaction, update, Executable, Filterable};
///
/// transaction(manager, |conn| {
///     async move {
///         update("accounts").decrement("balance", 10).where_(("id", 1)).execute_on(conn).await?;
///         update("accounts").increment("balance", 10).where_(("id", 2)).execute_on(conn).await?;
///         Ok::<_, quarry_core::Error>(())
///     }
///     .boxed()
/// })
/// .await
/// # }
/// ```
pub async fn transaction<M, F, T>(manager: &M, f: F) -> Result<T>
where
    M: ConnectionManager,
    F: for<'c> FnOnce(&'c mut M::Connection) -> BoxFuture<'c, Result<T>>,
{
    let mut connection = manager.get_connection().await?;
    let result = run_transaction(&mut connection, f).await;
    manager.release_connection(connection).await;
    result
}

async fn run_transaction<C, F, T>(connection: &mut C, f: F) -> Result<T>
where
    C: Connection,
    F: for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, Result<T>>,
{
    let dialect = connection.dialect();
    connection.query(dialect.begin_transaction_sql(), &[]).await?;
    tracing::trace!(dialect = dialect.name(), "transaction started");

    match f(&mut *connection).await {
        Ok(value) => match connection.query("COMMIT", &[]).await {
            Ok(_) => Ok(value),
            Err(error) => {
                rollback(connection).await;
                Err(error)
            }
        },
        Err(error) => {
            tracing::debug!(%error, "rolling back transaction");
            rollback(connection).await;
            Err(error)
        }
    }
}

/// Execution methods for every query builder
pub trait Executable: QueryBuilder + Sync {
    /// Render with the manager's dialect and run on a pooled connection
    fn execute<M>(&self, manager: &M) -> impl Future<Output = Result<QueryResult>> + Send
    where
        M: ConnectionManager;

    /// Render with the connection's dialect and run on `connection`
    fn execute_on<C>(&self, connection: &mut C) -> impl Future<Output = Result<QueryResult>> + Send
    where
        C: Connection;

    fn fetch_all<T, M>(&self, manager: &M) -> impl Future<Output = Result<Vec<T>>> + Send
    where
        T: DeserializeOwned,
        M: ConnectionManager;

    fn fetch_optional<T, M>(&self, manager: &M) -> impl Future<Output = Result<Option<T>>> + Send
    where
        T: DeserializeOwned,
        M: ConnectionManager;
}

impl<B: QueryBuilder + Sync> Executable for B {
    async fn execute<M>(&self, manager: &M) -> Result<QueryResult>
    where
        M: ConnectionManager,
    {
        let built = self.build_with(manager.dialect())?;
        let mut connection = manager.get_connection().await?;
        tracing::trace!(sql = %built.sql, "executing");
        let result = connection.query(&built.sql, &built.params).await;
        manager.release_connection(connection).await;
        result
    }

    async fn execute_on<C>(&self, connection: &mut C) -> Result<QueryResult>
    where
        C: Connection,
    {
        let built = self.build_with(connection.dialect())?;
        tracing::trace!(sql = %built.sql, "executing on held connection");
        connection.query(&built.sql, &built.params).await
    }

    async fn fetch_all<T, M>(&self, manager: &M) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        M: ConnectionManager,
    {
        self.execute(manager).await?.deserialize()
    }

    async fn fetch_optional<T, M>(&self, manager: &M) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        M: ConnectionManager,
    {
        self.execute(manager).await?.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{delete, from, insert, op, update, Error, Filterable};
    use futures::FutureExt;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct User {
        id: i32,
        name: String,
    }

    /// Records every statement; SELECTs return two users, `bad_table` fails
    struct MockConnection {
        dialect: Dialect,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Connection for MockConnection {
        async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{sql} {}", params.len()));
            if sql.contains("bad_table") {
                return Err(Error::Database(sqlx::Error::RowNotFound));
            }
            if !sql.starts_with("SELECT") {
                return Ok(QueryResult {
                    row_count: 1,
                    ..Default::default()
                });
            }
            let rows: Vec<Row> = [(1, "John"), (2, "Jane")]
                .into_iter()
                .map(|(id, name)| {
                    let mut row = Row::new();
                    row.insert("id".into(), id.into());
                    row.insert("name".into(), name.into());
                    row
                })
                .collect();
            Ok(QueryResult {
                row_count: rows.len() as u64,
                rows,
                fields: vec![Field {
                    name: "id".into(),
                    type_name: "INT4".into(),
                }],
            })
        }

        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn close(self) -> Result<()> {
            Ok(())
        }
    }

    struct MockManager {
        dialect: Dialect,
        log: Arc<Mutex<Vec<String>>>,
        released: AtomicUsize,
    }

    impl MockManager {
        fn new(dialect: Dialect) -> Self {
            Self {
                dialect,
                log: Arc::default(),
                released: AtomicUsize::new(0),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl ConnectionManager for MockManager {
        type Connection = MockConnection;

        async fn get_connection(&self) -> Result<MockConnection> {
            Ok(MockConnection {
                dialect: self.dialect,
                log: self.log.clone(),
            })
        }

        async fn release_connection(&self, _connection: MockConnection) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn dialect(&self) -> Dialect {
            self.dialect
        }
    }

    #[tokio::test]
    async fn test_fetch_all_deserializes_rows() {
        let manager = MockManager::new(Dialect::Postgres);
        let users: Vec<User> = from("users")
            .columns(["id", "name"])
            .where_(("age", op::GT, 18))
            .fetch_all(&manager)
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].name, "Jane");
        assert_eq!(manager.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_optional_takes_first_row() {
        let manager = MockManager::new(Dialect::Postgres);
        let user: Option<User> = from("users")
            .where_(("id", 1))
            .fetch_optional(&manager)
            .await
            .unwrap();
        assert_eq!(
            user,
            Some(User {
                id: 1,
                name: "John".into()
            })
        );
    }

    #[tokio::test]
    async fn test_execute_renders_with_manager_dialect() {
        let manager = MockManager::new(Dialect::Mysql);
        let result = delete("users")
            .where_(("id", 3))
            .execute(&manager)
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(manager.statements(), vec!["DELETE FROM `users` WHERE `id` = ? 1"]);
    }

    #[tokio::test]
    async fn test_invalid_query_never_acquires() {
        let manager = MockManager::new(Dialect::Postgres);
        let err = delete("users").execute(&manager).await.unwrap_err();
        assert!(matches!(err, Error::MissingClause { .. }));
        assert!(manager.statements().is_empty());
        assert_eq!(manager.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_error_propagates_and_releases() {
        let manager = MockManager::new(Dialect::Postgres);
        let err = insert("bad_table")
            .values([("id", 1)])
            .execute(&manager)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(sqlx::Error::RowNotFound)));
        assert_eq!(manager.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let manager = MockManager::new(Dialect::Postgres);
        let out = transaction(&manager, |conn| {
            async move {
                update("users")
                    .set([("name", "x")])
                    .where_(("id", 1))
                    .execute_on(conn)
                    .await?;
                Ok::<i32, Error>(42)
            }
            .boxed()
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(
            manager.statements(),
            vec![
                "BEGIN 0",
                r#"UPDATE "users" SET "name" = $1 WHERE "id" = $2 2"#,
                "COMMIT 0",
            ]
        );
        assert_eq!(manager.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_and_rethrows() {
        let manager = MockManager::new(Dialect::Mysql);
        let err = transaction(&manager, |conn| {
            async move {
                conn.query("INSERT INTO bad_table VALUES (1)", &[]).await?;
                Ok::<(), Error>(())
            }
            .boxed()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(
            manager.statements(),
            vec![
                "START TRANSACTION 0",
                "INSERT INTO bad_table VALUES (1) 0",
                "ROLLBACK 0",
            ]
        );
        assert_eq!(manager.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transaction_statements_follow_connection_dialect() {
        let manager = MockManager::new(Dialect::Mysql);
        transaction(&manager, |conn| {
            async move {
                update("accounts")
                    .set([("a", 1)])
                    .where_(("id", 2))
                    .execute_on(conn)
                    .await?;
                Ok::<(), Error>(())
            }
            .boxed()
        })
        .await
        .unwrap();
        assert_eq!(
            manager.statements(),
            vec![
                "START TRANSACTION 0",
                "UPDATE `accounts` SET `a` = ? WHERE `id` = ? 2",
                "COMMIT 0",
            ]
        );
    }

    #[test]
    fn test_execute_on_uses_connection_dialect() {
        let manager = MockManager::new(Dialect::Sqlite);
        let result = tokio_test::block_on(async {
            let mut conn = manager.get_connection().await?;
            from("users")
                .dialect(Dialect::Postgres)
                .where_(("id", 1))
                .execute_on(&mut conn)
                .await
        });
        assert_eq!(result.unwrap().row_count, 2);
        assert_eq!(
            manager.statements(),
            vec![r#"SELECT * FROM "users" WHERE "id" = ? 1"#]
        );
    }

    #[test]
    fn test_query_result_first_on_empty() {
        let first: Option<User> = QueryResult::default().first().unwrap();
        assert!(first.is_none());
    }
}
