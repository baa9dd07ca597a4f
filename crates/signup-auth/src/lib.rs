pub mod error;
pub mod password;
pub mod sanitize;
pub mod store;
pub mod validation;

pub use error::{AuthError, ErrorKind, FieldError};
pub use store::{CredentialStore, parse_id};
pub use validation::{Payload, Pipeline};

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use signup_db::{Database, PoolOptions};
    use signup_types::config::DeploymentMode;

    use crate::store::CredentialStore;

    /// Store over a fresh in-memory database with the schema applied.
    pub(crate) async fn open_store() -> CredentialStore {
        let options = PoolOptions {
            max_size: 2,
            acquire_timeout: Duration::from_millis(500),
            mode: DeploymentMode::Test,
        };
        let db = Database::open(":memory:", options).unwrap();
        db.create_schema().await.unwrap();
        CredentialStore::new(db, 1)
    }
}
