//! Admin credential hashing with Argon2id.
//!
//! Each hash uses a fresh random salt, so equal secrets never produce equal
//! digests. Verification goes through the argon2 crate's constant-time
//! comparison.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential hashing failed: {0}")]
    Hash(String),

    #[error("stored credential hash is malformed: {0}")]
    MalformedHash(String),
}

/// Hash a secret into a PHC-format Argon2id string.
pub fn hash_secret(secret: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Verify a secret against a stored digest. Returns `Ok(false)` on mismatch;
/// errors only when the stored digest itself cannot be parsed.
pub fn verify_secret(secret: &str, digest: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(digest)
        .map_err(|e| CredentialError::MalformedHash(e.to_string()))?;

    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CredentialError::MalformedHash(e.to_string())),
    }
}
