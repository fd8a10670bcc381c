//! Bounded connection pool
//!
//! At most `max_connections` connections are checked out at once. Acquiring
//! waits for a free slot, optionally bounded by an acquire timeout. Released
//! connections go back to the idle list until `max_idle` are held, after which
//! they are closed.

use crate::config::PoolConfig;
use crate::executor::{Connection, ConnectionManager, QueryResult};
use crate::{Dialect, Error, Result, Value};
use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Opens new connections for a [`Pool`]
pub trait Connect: Send + Sync + 'static {
    type Connection: Connection + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection>> + Send;

    fn dialect(&self) -> Dialect;
}

struct Shared<C: Connect> {
    connector: C,
    idle: Mutex<VecDeque<C::Connection>>,
    semaphore: Arc<Semaphore>,
    max_idle: usize,
    acquire_timeout: Option<Duration>,
}

/// Connection pool; cheap to clone
pub struct Pool<C: Connect> {
    shared: Arc<Shared<C>>,
}

impl<C: Connect> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// A checked-out connection holding one pool slot
///
/// Hand it back with [`ConnectionManager::release_connection`]; dropping it
/// frees the slot and discards the connection.
pub struct PooledConnection<T> {
    connection: T,
    _permit: OwnedSemaphorePermit,
}

impl<T> Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.connection
    }
}

impl<T> DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.connection
    }
}

impl<T: Connection> Connection for PooledConnection<T> {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.connection.query(sql, params).await
    }

    fn dialect(&self) -> Dialect {
        self.connection.dialect()
    }

    async fn close(self) -> Result<()> {
        self.connection.close().await
    }
}

impl<C: Connect> Pool<C> {
    /// Fails when `max_connections` is zero
    pub fn new(connector: C, max_connections: usize) -> Result<Self> {
        Self::with_config(connector, max_connections, max_connections, None)
    }

    /// Pool sized by a [`PoolConfig`]
    pub fn from_config(connector: C, config: &PoolConfig) -> Result<Self> {
        Self::with_config(
            connector,
            config.max_connections,
            config.effective_max_idle(),
            config.acquire_timeout_duration(),
        )
    }

    fn with_config(
        connector: C,
        max_connections: usize,
        max_idle: usize,
        acquire_timeout: Option<Duration>,
    ) -> Result<Self> {
        // a zero-permit semaphore would park every acquire forever
        if max_connections == 0 {
            return Err(Error::config("max_connections must be at least 1"));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                connector,
                idle: Mutex::new(VecDeque::new()),
                semaphore: Arc::new(Semaphore::new(max_connections)),
                max_idle: max_idle.min(max_connections),
                acquire_timeout,
            }),
        })
    }

    /// Slots not currently checked out
    pub fn available(&self) -> usize {
        self.shared.semaphore.available_permits()
    }

    pub async fn idle_count(&self) -> usize {
        self.shared.idle.lock().await.len()
    }

    pub async fn acquire(&self) -> Result<PooledConnection<C::Connection>> {
        let shared = &self.shared;
        let permit = shared.semaphore.clone().acquire_owned();
        let permit = match shared.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, permit)
                .await
                .map_err(|_| Error::PoolTimeout)?,
            None => permit.await,
        }
        .map_err(|_| Error::pool("pool is closed"))?;

        let reused = shared.idle.lock().await.pop_front();
        let connection = match reused {
            Some(connection) => {
                tracing::trace!("reusing idle connection");
                connection
            }
            None => {
                tracing::debug!(dialect = %shared.connector.dialect(), "opening connection");
                shared.connector.connect().await?
            }
        };

        Ok(PooledConnection {
            connection,
            _permit: permit,
        })
    }

    pub async fn release(&self, pooled: PooledConnection<C::Connection>) {
        let PooledConnection {
            connection,
            _permit: permit,
        } = pooled;

        let surplus = {
            let mut idle = self.shared.idle.lock().await;
            if idle.len() < self.shared.max_idle && !self.shared.semaphore.is_closed() {
                idle.push_back(connection);
                None
            } else {
                Some(connection)
            }
        };

        if let Some(connection) = surplus {
            tracing::debug!("closing surplus connection");
            if let Err(error) = connection.close().await {
                tracing::warn!(%error, "failed to close connection");
            }
        }
        drop(permit);
    }

    /// Refuse new acquires and close every idle connection
    pub async fn close(&self) {
        self.shared.semaphore.close();
        let drained: Vec<_> = self.shared.idle.lock().await.drain(..).collect();
        tracing::debug!(count = drained.len(), "closing idle connections");
        for connection in drained {
            if let Err(error) = connection.close().await {
                tracing::warn!(%error, "failed to close connection");
            }
        }
    }
}

impl<C: Connect> ConnectionManager for Pool<C> {
    type Connection = PooledConnection<C::Connection>;

    async fn get_connection(&self) -> Result<Self::Connection> {
        self.acquire().await
    }

    async fn release_connection(&self, connection: Self::Connection) {
        self.release(connection).await
    }

    fn dialect(&self) -> Dialect {
        self.shared.connector.dialect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from, Executable, Filterable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct MockConnector {
        counters: Arc<Counters>,
    }

    struct MockConnection {
        counters: Arc<Counters>,
    }

    impl Connection for MockConnection {
        async fn query(&mut self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
            Ok(QueryResult::default())
        }

        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn close(self) -> Result<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Connect for MockConnector {
        type Connection = MockConnection;

        async fn connect(&self) -> Result<MockConnection> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(MockConnection {
                counters: self.counters.clone(),
            })
        }

        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }
    }

    fn connector() -> (MockConnector, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let connector = MockConnector {
            counters: counters.clone(),
        };
        (connector, counters)
    }

    fn pool(config: &PoolConfig) -> (Pool<MockConnector>, Arc<Counters>) {
        let (connector, counters) = connector();
        (Pool::from_config(connector, config).unwrap(), counters)
    }

    #[test]
    fn test_zero_sized_pool_rejected() {
        let (mock, _) = connector();
        let err = Pool::new(mock, 0).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));

        let (mock, _) = connector();
        let config = PoolConfig::new("sqlite::memory:").max_connections(0);
        assert!(matches!(
            Pool::from_config(mock, &config).err(),
            Some(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_new_pool_sizes_idle_to_max() {
        let (mock, counters) = connector();
        let pool = Pool::new(mock, 2).unwrap();
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);
        pool.release(a).await;
        pool.release(b).await;
        assert_eq!(pool.idle_count().await, 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_released_connection_is_reused() {
        let (pool, counters) = pool(&PoolConfig::new("sqlite::memory:").max_connections(2));
        let first = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 1);
        pool.release(first).await;
        let second = pool.acquire().await.unwrap();
        pool.release(second).await;

        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count().await, 1);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_surplus_connection_closed() {
        let config = PoolConfig::new("sqlite::memory:")
            .max_connections(2)
            .max_idle(0);
        let (pool, counters) = pool(&config);
        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count().await, 0);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let config = PoolConfig::new("sqlite::memory:")
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(20));
        let (pool, _) = pool(&config);
        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, Error::PoolTimeout));
        pool.release(held).await;
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_resumes_after_release() {
        let (pool, counters) = pool(&PoolConfig::new("sqlite::memory:").max_connections(1));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let conn = pool.acquire().await?;
                pool.release(conn).await;
                Ok::<_, Error>(())
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        pool.release(held).await;
        waiter.await.unwrap().unwrap();
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let (pool, counters) = pool(&PoolConfig::new("sqlite::memory:"));
        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;
        pool.close().await;

        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.acquire().await.err(), Some(Error::Pool { .. })));
    }

    #[tokio::test]
    async fn test_builder_executes_through_pool() {
        let (pool, counters) = pool(&PoolConfig::new("sqlite::memory:"));
        let result = from("users")
            .where_(("id", 1))
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(result.row_count, 0);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count().await, 1);
    }
}
