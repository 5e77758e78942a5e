//! Core trait definitions

use crate::error::AuthResult;
use crate::types::Identity;
use async_trait::async_trait;

/// Persistent identity storage
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Check whether a username is taken
    async fn exists_by_username(&self, username: &str) -> AuthResult<bool>;

    /// Persist a new identity. Must fail with `AlreadyExists` when the username
    /// is taken, even if a concurrent `save` won the race after the caller's
    /// existence check.
    async fn save(&self, identity: Identity) -> AuthResult<Identity>;

    /// Look up an identity by username
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Identity>>;

    /// Number of stored identities
    async fn count(&self) -> AuthResult<usize>;
}

/// One-way password hashing used by registration and login
///
/// Both operations are CPU-bound and slow on purpose; async callers run them
/// through `password::hash_off_thread` and `password::verify_off_thread`.
pub trait CredentialHasher: Send + Sync {
    /// Produce a salted verifier for a plaintext
    fn hash(&self, plaintext: &str) -> AuthResult<String>;

    /// Check a plaintext against a stored verifier
    fn verify(&self, plaintext: &str, verifier: &str) -> bool;
}
