// Password hashing and verification service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::{error, warn};

use crate::auth::error::AuthError;

/// Message returned alongside a failed verification
pub const PASSWORD_MISMATCH: &str = "Password doesn't match";

/// Password service for hashing and verification
pub struct PasswordService;

impl PasswordService {
    /// Hash a password using Argon2id with a fresh random salt
    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("Argon2 hashing failed: {}", e);
                AuthError::PasswordHashError
            })
    }

    /// Verify a candidate password against a stored hash
    ///
    /// A mismatch is a normal outcome reported as `(false, message)`.
    /// An unparseable stored hash is treated the same way.
    pub fn verify_password(hash: &str, candidate: &str) -> (bool, String) {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Stored password hash is not a valid PHC string: {}", e);
                return (false, PASSWORD_MISMATCH.to_string());
            }
        };

        match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => (true, String::new()),
            Err(_) => (false, PASSWORD_MISMATCH.to_string()),
        }
    }
}
