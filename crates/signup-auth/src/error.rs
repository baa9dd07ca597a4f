use serde::Serialize;
use thiserror::Error;

use signup_db::DbError;

/// One failed format rule, reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("validation failed: {}", summarize(.0))]
    ValidationFailed(Vec<FieldError>),

    #[error("username already exists")]
    DuplicateUsername,

    /// Covers both unknown usernames and wrong passwords.
    #[error("username or password incorrect")]
    AuthenticationFailed,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// How a failure should be presented to whoever made the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request can be corrected; the message is safe to show.
    Client,
    /// Something on our side failed; show a generic, retryable error.
    Service,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidIdentifier(_)
            | AuthError::ValidationFailed(_)
            | AuthError::DuplicateUsername
            | AuthError::AuthenticationFailed => ErrorKind::Client,
            AuthError::Hashing(_) | AuthError::Database(_) => ErrorKind::Service,
        }
    }

    /// Insert and update paths turn a UNIQUE violation on `users.username`
    /// into `DuplicateUsername`; the pre-insert lookup cannot close that race.
    pub(crate) fn from_write(err: DbError) -> Self {
        if err.is_unique_violation() {
            AuthError::DuplicateUsername
        } else {
            AuthError::Database(err)
        }
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert_eq!(AuthError::AuthenticationFailed.kind(), ErrorKind::Client);
        assert_eq!(AuthError::DuplicateUsername.kind(), ErrorKind::Client);
        assert_eq!(
            AuthError::Database(DbError::PoolExhausted).kind(),
            ErrorKind::Service
        );
        assert_eq!(
            AuthError::Database(DbError::MalformedUpdate { fields: 1, values: 2 }).kind(),
            ErrorKind::Service
        );
    }

    #[test]
    fn validation_message_lists_fields() {
        let err = AuthError::ValidationFailed(vec![
            FieldError::new("username", "too short"),
            FieldError::new("password", "too long"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: username: too short; password: too long"
        );
    }
}
