use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("no database connection became available within the pool limits")]
    PoolExhausted,

    #[error("database pool has been closed")]
    PoolClosed,

    #[error("cannot open database: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    /// Caller passed field and value sequences of different lengths.
    #[error("conditional update got {fields} fields but {values} values")]
    MalformedUpdate { fields: usize, values: usize },

    #[error("cannot decode column {column}: {reason}")]
    Decode { column: String, reason: String },

    #[error("database worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl DbError {
    /// True when the statement was rejected by a UNIQUE constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::QueryFailed(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            }
            _ => false,
        }
    }

    /// Pool and driver failures are transient from the caller's point of view.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DbError::MalformedUpdate { .. } | DbError::Decode { .. })
    }
}
