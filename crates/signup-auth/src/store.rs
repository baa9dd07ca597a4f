use tracing::{info, warn};
use zeroize::Zeroizing;

use signup_db::update::UserColumn;
use signup_db::{Database, DbError, FieldValue, FromRecord, Record, Updated, Value};
use signup_types::config::Config;
use signup_types::models::User;

use crate::error::AuthError;
use crate::password::{self, CREATION_COST, DUMMY_HASH};
use crate::sanitize::strip_markup;

/// A user row including its password hash. Never leaves this module.
struct UserRecord {
    user: User,
    password_hash: Zeroizing<String>,
}

impl FromRecord for UserRecord {
    fn from_record(record: &Record<'_>) -> Result<Self, DbError> {
        Ok(UserRecord {
            user: User {
                id: record.get("id")?,
                name: record.get("name")?,
                username: record.get("username")?,
            },
            password_hash: Zeroizing::new(record.get("password")?),
        })
    }
}

/// Parse a user id taken from a request path or body.
pub fn parse_id(raw: &str) -> Result<i64, AuthError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AuthError::InvalidIdentifier(raw.to_string())),
    }
}

/// User lookup, creation and update. Owns everything that touches password
/// hashes.
#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
    update_cost: u32,
}

impl CredentialStore {
    /// `update_cost` is the Argon2 iteration count used when a password is
    /// changed. Account creation always uses [`CREATION_COST`].
    pub fn new(db: Database, update_cost: u32) -> Self {
        Self { db, update_cost }
    }

    pub fn from_config(db: Database, config: &Config) -> Self {
        Self::new(db, config.hash_cost)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        Ok(self.record_by_username(username).await?.map(|r| r.user))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, AuthError> {
        let record: Option<UserRecord> = self
            .db
            .execute(
                "SELECT id, name, username, password FROM users WHERE id = ?1",
                vec![Value::Integer(id)],
            )
            .await?
            .decode_first()?;
        Ok(record.map(|r| r.user))
    }

    pub async fn find_all(&self) -> Result<Vec<User>, AuthError> {
        let records: Vec<UserRecord> = self
            .db
            .execute(
                "SELECT id, name, username, password FROM users ORDER BY id",
                vec![],
            )
            .await?
            .decode()?;
        Ok(records.into_iter().map(|r| r.user).collect())
    }

    async fn record_by_username(&self, username: &str) -> Result<Option<UserRecord>, DbError> {
        self.db
            .execute(
                "SELECT id, name, username, password FROM users WHERE username = ?1",
                vec![Value::Text(username.to_string())],
            )
            .await?
            .decode_first()
    }

    /// Register a user. The password is hashed at [`CREATION_COST`] before
    /// anything is written.
    pub async fn create(&self, name: &str, username: &str, password: &str) -> Result<User, AuthError> {
        let hash = password::hash_password(password, CREATION_COST).await?;

        let record: Option<UserRecord> = self
            .db
            .execute(
                "INSERT INTO users (name, username, password)
                 VALUES (?1, ?2, ?3)
                 RETURNING id, name, username, password",
                vec![
                    Value::Text(strip_markup(name)),
                    Value::Text(strip_markup(username)),
                    Value::Text(hash),
                ],
            )
            .await
            .map_err(AuthError::from_write)?
            .decode_first()?;

        let user = record
            .map(|r| r.user)
            .ok_or_else(|| DbError::Decode {
                column: "id".into(),
                reason: "insert returned no row".into(),
            })?;

        info!(user_id = user.id, "User created");
        Ok(user)
    }

    /// Change username and/or password of user `id`.
    ///
    /// Username is written only when it is non-empty after markup is stripped;
    /// password only when one is supplied, re-hashed at the configured cost.
    /// Nothing else about a user can be changed here.
    pub async fn update(
        &self,
        id: i64,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Updated<User>, AuthError> {
        if id <= 0 {
            return Err(AuthError::InvalidIdentifier(id.to_string()));
        }

        let username = username.map(strip_markup).filter(|u| !u.is_empty());
        let password_hash = match password.filter(|p| !p.is_empty()) {
            Some(plain) => Some(password::hash_password(plain, self.update_cost).await?),
            None => None,
        };

        let outcome = self
            .db
            .conditional_update(
                id,
                &[UserColumn::Username, UserColumn::Password],
                &[FieldValue::from(username), FieldValue::from(password_hash)],
            )
            .await
            .map_err(AuthError::from_write)?;

        let updated = outcome.decode::<UserRecord>()?.map(|r| r.user);
        if let Updated::Row(user) = &updated {
            info!(user_id = user.id, "User updated");
        }
        Ok(updated)
    }

    /// Check a plaintext password against a stored hash in constant time.
    pub async fn compare_password(&self, password: &str, hash: &str) -> bool {
        password::compare_password(password, hash).await
    }

    /// Look up `username` and check `password`. Unknown user, lookup failure
    /// and mismatch all come back as the same `AuthenticationFailed`, and all
    /// three pay for one Argon2 verification.
    pub async fn verify_login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let record = match self.record_by_username(username).await {
            Ok(record) => record,
            Err(e) => {
                warn!(username, "Login lookup failed: {}", e);
                None
            }
        };

        let Some(record) = record else {
            self.compare_password(password, DUMMY_HASH).await;
            info!(username, "Invalid login attempt");
            return Err(AuthError::AuthenticationFailed);
        };

        if self.compare_password(password, &record.password_hash).await {
            Ok(record.user)
        } else {
            info!(username, "Invalid login attempt");
            Err(AuthError::AuthenticationFailed)
        }
    }
}
