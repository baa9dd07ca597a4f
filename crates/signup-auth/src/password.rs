use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::warn;
use zeroize::Zeroizing;

use crate::error::AuthError;

/// Argon2id iteration count for hashes written at account creation.
/// Fixed; `SIGNUP_HASH_COST` only affects password changes.
pub const CREATION_COST: u32 = 4;

/// Well-formed hash at [`CREATION_COST`] that no password matches. Verified
/// against when there is no stored hash so that a miss costs as much as a
/// wrong password.
pub(crate) const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=4,p=1$hSVxGPyZW84BzFUvxGnbGw$mTudJ5V3x7qVRpXjYTiepRlk7gNqx1vboNcEtMUtsgA";

/// Hash `password` with Argon2id using `cost` iterations and a fresh salt.
///
/// Runs on the blocking pool. The copy of the plaintext handed to the worker is
/// wiped when it is dropped.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = Zeroizing::new(password.to_owned());

    tokio::task::spawn_blocking(move || hash_blocking(password.as_bytes(), cost))
        .await
        .map_err(|e| AuthError::Hashing(format!("task join error: {}", e)))?
}

fn hash_blocking(password: &[u8], cost: u32) -> Result<String, AuthError> {
    let params = Params::new(Params::DEFAULT_M_COST, cost, Params::DEFAULT_P_COST, None)
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    let salt = SaltString::generate(&mut OsRng);

    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Check `password` against a stored hash.
///
/// The digest comparison inside Argon2 verification is constant-time, so the
/// position of the first differing character does not affect timing. A hash
/// that cannot be parsed never matches.
pub async fn compare_password(password: &str, hash: &str) -> bool {
    let password = Zeroizing::new(password.to_owned());
    let hash = hash.to_owned();

    match tokio::task::spawn_blocking(move || verify_blocking(password.as_bytes(), &hash)).await {
        Ok(matched) => matched,
        Err(e) => {
            warn!("Password verification task failed: {}", e);
            false
        }
    }
}

fn verify_blocking(password: &[u8], hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    // Parameters come from the hash itself.
    Argon2::default().verify_password(password, &parsed).is_ok()
}
