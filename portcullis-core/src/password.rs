//! Salted one-way password hashing

use crate::error::{AuthError, AuthResult};
use crate::traits::CredentialHasher;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Argon2 password encoder
///
/// Verifiers are PHC strings (`$argon2id$v=19$...`) carrying their own salt and
/// parameters, so a verifier produced with one configuration still verifies
/// after the defaults change.
#[derive(Debug, Clone, Default)]
pub struct PasswordEncoder {
    argon2: Argon2<'static>,
}

impl PasswordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a plaintext with a fresh random salt
    pub fn hash(&self, plaintext: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Check a plaintext against a stored verifier. Malformed verifiers never match.
    pub fn verify(&self, plaintext: &str, verifier: &str) -> bool {
        let parsed_hash = match PasswordHash::new(verifier) {
            Ok(hash) => hash,
            Err(e) => {
                debug!("Rejecting malformed password verifier: {}", e);
                return false;
            }
        };

        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

impl CredentialHasher for PasswordEncoder {
    fn hash(&self, plaintext: &str) -> AuthResult<String> {
        PasswordEncoder::hash(self, plaintext)
    }

    fn verify(&self, plaintext: &str, verifier: &str) -> bool {
        PasswordEncoder::verify(self, plaintext, verifier)
    }
}

/// Hash on the blocking pool so a slow hash never stalls the async workers
pub async fn hash_off_thread(
    hasher: Arc<dyn CredentialHasher>,
    plaintext: String,
) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .map_err(|e| AuthError::Hashing(format!("hashing task failed: {}", e)))?
}

/// Verify on the blocking pool. A task that dies counts as a mismatch.
pub async fn verify_off_thread(
    hasher: Arc<dyn CredentialHasher>,
    plaintext: String,
    verifier: String,
) -> bool {
    match tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &verifier)).await {
        Ok(matches) => matches,
        Err(e) => {
            error!("Password verification task failed: {}", e);
            false
        }
    }
}
