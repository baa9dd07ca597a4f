use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use signup_types::config::{Config, DeploymentMode, DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_POOL_SIZE};

use crate::error::DbError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_size: usize,
    pub acquire_timeout: Duration,
    pub mode: DeploymentMode,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_SIZE,
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
            mode: DeploymentMode::default(),
        }
    }
}

impl From<&Config> for PoolOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_size: config.pool_size,
            acquire_timeout: config.acquire_timeout,
            mode: config.mode,
        }
    }
}

/// Where connections point, parsed from `DATABASE_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    /// Shared-cache in-memory database; lives as long as the pool does.
    Memory(String),
}

impl Target {
    pub fn parse(url: &str) -> Self {
        let url = url.trim();
        if matches!(url, ":memory:" | "sqlite::memory:" | "sqlite://:memory:") {
            return Target::Memory(format!(
                "file:signup-{}?mode=memory&cache=shared",
                Uuid::new_v4()
            ));
        }

        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Target::File(PathBuf::from(path))
    }

    fn connect(&self, mode: DeploymentMode) -> rusqlite::Result<Connection> {
        let conn = match self {
            Target::File(path) => {
                let mut flags = OpenFlags::default();
                if mode == DeploymentMode::Production {
                    flags.remove(OpenFlags::SQLITE_OPEN_CREATE);
                }
                let conn = Connection::open_with_flags(path, flags)?;
                // WAL mode for concurrent reads
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn
            }
            Target::Memory(uri) => Connection::open_with_flags(uri, OpenFlags::default())?,
        };

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// Fixed-size set of connections. A permit from `permits` entitles its holder
/// to exactly one connection from `idle`, so the stack is never empty while a
/// permit is outstanding.
pub(crate) struct Pool {
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Duration,
}

impl Pool {
    pub(crate) fn open(target: &Target, options: &PoolOptions) -> Result<Arc<Self>, DbError> {
        let size = options.max_size.max(1);
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            conns.push(target.connect(options.mode).map_err(DbError::Open)?);
        }

        info!("Connection pool opened ({} connections)", size);
        Ok(Arc::new(Self {
            idle: Mutex::new(conns),
            permits: Arc::new(Semaphore::new(size)),
            size,
            acquire_timeout: options.acquire_timeout,
        }))
    }

    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, DbError> {
        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DbError::PoolClosed),
            Err(_) => {
                warn!("Timed out after {:?} waiting for a connection", self.acquire_timeout);
                return Err(DbError::PoolExhausted);
            }
        };

        let conn = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(DbError::PoolExhausted)?;

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Wait for every checked-out connection to come back, then close them all.
    /// Acquisitions queued behind the drain fail with `PoolClosed`.
    pub(crate) async fn drain(&self) {
        let Ok(all) = self.permits.acquire_many(self.size as u32).await else {
            return;
        };
        self.permits.close();
        let closed = {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *idle)
        };
        drop(all);

        let count = closed.len();
        for conn in closed {
            if let Err((_, e)) = conn.close() {
                warn!("Error closing connection: {}", e);
            }
        }
        info!("Connection pool closed ({} connections)", count);
    }

    #[cfg(test)]
    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A connection checked out of the pool. Dropping it puts the connection back
/// before the permit is released, on every path including panics.
pub(crate) struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<Pool>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `drop` takes the connection out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max_size: usize, timeout_ms: u64) -> PoolOptions {
        PoolOptions {
            max_size,
            acquire_timeout: Duration::from_millis(timeout_ms),
            mode: DeploymentMode::Test,
        }
    }

    #[test]
    fn parses_targets() {
        assert_eq!(
            Target::parse("sqlite://data/signup.db"),
            Target::File(PathBuf::from("data/signup.db"))
        );
        assert_eq!(
            Target::parse("signup.db"),
            Target::File(PathBuf::from("signup.db"))
        );
        assert!(matches!(Target::parse("sqlite::memory:"), Target::Memory(_)));
        // Each in-memory target is a distinct database.
        assert_ne!(Target::parse(":memory:"), Target::parse(":memory:"));
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = Pool::open(&Target::parse(":memory:"), &options(1, 50)).unwrap();

        let held = pool.acquire().await.unwrap();
        assert!(matches!(pool.acquire().await, Err(DbError::PoolExhausted)));

        drop(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn guard_returns_connection() {
        let pool = Pool::open(&Target::parse(":memory:"), &options(2, 50)).unwrap();
        assert_eq!(pool.idle_count(), 2);

        {
            let _a = pool.acquire().await.unwrap();
            let _b = pool.acquire().await.unwrap();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn drain_waits_for_checked_out_connections() {
        let pool = Pool::open(&Target::parse(":memory:"), &options(1, 1_000)).unwrap();
        let held = pool.acquire().await.unwrap();

        let draining = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.drain().await })
        };
        tokio::task::yield_now().await;
        assert!(!draining.is_finished());

        drop(held);
        draining.await.unwrap();
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(pool.acquire().await, Err(DbError::PoolClosed)));
    }

    #[test]
    fn production_does_not_create_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let target = Target::File(path.clone());

        let mut opts = options(1, 50);
        opts.mode = DeploymentMode::Production;
        assert!(matches!(Pool::open(&target, &opts), Err(DbError::Open(_))));
        assert!(!path.exists());

        opts.mode = DeploymentMode::Development;
        assert!(Pool::open(&target, &opts).is_ok());
        assert!(path.exists());
    }
}
