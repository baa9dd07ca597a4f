pub mod error;
pub mod migrations;
pub mod pool;
pub mod queries;
pub mod rows;
pub mod update;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use signup_types::config::{Config, DeploymentMode};

pub use error::DbError;
pub use pool::{PoolOptions, Target};
pub use rusqlite::types::Value;
pub use rows::{FromRecord, Record, RowSet};
pub use update::{Column, FieldValue, UpdateOutcome, UpdateStatement, Updated};

use pool::Pool;

/// Handle to the connection pool. Cheap to clone; every clone shares the same
/// connections. Built explicitly with [`Database::open`] and torn down with
/// [`Database::close`].
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool>,
    mode: DeploymentMode,
}

impl Database {
    pub fn open(url: &str, options: PoolOptions) -> Result<Self, DbError> {
        let target = Target::parse(url);
        let pool = Pool::open(&target, &options)?;

        info!("Database opened at {:?}", target);
        Ok(Self {
            pool,
            mode: options.mode,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, DbError> {
        Self::open(&config.database_url, PoolOptions::from(config))
    }

    /// Run one statement with `params` bound to `?1`, `?2`, ... in order.
    ///
    /// The connection goes back to the pool whether the statement succeeds or
    /// not. Failures are logged here and returned to the caller.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<RowSet, DbError> {
        let result = self.run(sql.to_owned(), params).await;
        if let Err(e) = &result {
            self.log_failure(e);
        }
        result
    }

    async fn run(&self, sql: String, params: Vec<Value>) -> Result<RowSet, DbError> {
        let conn = self.pool.acquire().await?;

        // Run blocking SQLite work off the async runtime
        let row_set =
            tokio::task::spawn_blocking(move || rows::collect(&conn, &sql, &params)).await??;
        Ok(row_set)
    }

    /// Run a multi-statement script, such as the schema files.
    pub async fn execute_script(&self, script: &str) -> Result<(), DbError> {
        let conn = self.pool.acquire().await?;
        let script = script.to_owned();

        let result = tokio::task::spawn_blocking(move || conn.execute_batch(&script))
            .await
            .map_err(DbError::from)
            .and_then(|r| r.map_err(DbError::from));

        if let Err(e) = &result {
            self.log_failure(e);
        }
        result
    }

    /// Wait for in-flight queries, then close every connection. Calls made
    /// after this fail with [`DbError::PoolClosed`].
    pub async fn close(&self) {
        self.pool.drain().await;
    }

    fn log_failure(&self, e: &DbError) {
        match e {
            DbError::PoolExhausted | DbError::PoolClosed => warn!("Unable to get connection: {}", e),
            _ if self.mode == DeploymentMode::Test => debug!("Unable to query: {}", e),
            _ => error!("Unable to query: {}", e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::open_with_schema;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[tokio::test]
    async fn binds_parameters_positionally() {
        let db = open_with_schema(2).await;

        let inserted = db
            .execute(
                "INSERT INTO users (name, username, password) VALUES (?1, ?2, ?3)",
                vec![text("Ann"), text("ann'; DROP TABLE users; --"), text("hash")],
            )
            .await
            .unwrap();
        assert_eq!(inserted.row_count(), 1);

        let rows = db
            .execute(
                "SELECT username FROM users WHERE username = ?1",
                vec![text("ann'; DROP TABLE users; --")],
            )
            .await
            .unwrap();
        assert_eq!(rows.row_count(), 1);
        let username: String = rows.records().next().unwrap().get("username").unwrap();
        assert_eq!(username, "ann'; DROP TABLE users; --");
    }

    #[tokio::test]
    async fn failed_statement_releases_connection() {
        let db = open_with_schema(1).await;

        let err = db
            .execute("SELECT * FROM no_such_table", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));

        // With a single connection this would time out if the failure leaked it.
        let rows = db.execute("SELECT id FROM users", vec![]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn unique_violation_is_detectable() {
        let db = open_with_schema(1).await;
        let insert = "INSERT INTO users (username, password) VALUES (?1, ?2)";

        db.execute(insert, vec![text("ann"), text("h")]).await.unwrap();
        let err = db
            .execute(insert, vec![text("ann"), text("h")])
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn closed_database_rejects_queries() {
        let db = open_with_schema(2).await;
        db.close().await;

        let err = db.execute("SELECT 1", vec![]).await.unwrap_err();
        assert!(matches!(err, DbError::PoolClosed));
    }

    #[tokio::test]
    async fn concurrent_queries_share_the_pool() {
        let db = open_with_schema(2).await;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.execute("SELECT ?1 AS n", vec![Value::Integer(i)]).await
                })
            })
            .collect();

        for handle in handles {
            let rows = handle.await.unwrap().unwrap();
            assert_eq!(rows.row_count(), 1);
        }
    }
}
