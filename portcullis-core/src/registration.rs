//! Registration workflow

use crate::error::{AuthError, AuthResult};
use crate::password::hash_off_thread;
use crate::traits::{CredentialHasher, CredentialStore};
use crate::types::{Credentials, Identity, Role};
use std::sync::Arc;
use tracing::{debug, info};

/// Creates new identities in the credential store
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn CredentialStore>, hasher: impl CredentialHasher + 'static) -> Self {
        Self {
            store,
            hasher: Arc::new(hasher),
        }
    }

    /// Self-registration. New identities always get `Role::User`.
    pub async fn register(&self, credentials: &Credentials) -> AuthResult<Identity> {
        self.create(credentials, Role::User).await
    }

    /// Create the identity if the username is free; return the existing one otherwise.
    ///
    /// Used at startup to seed an administrator.
    pub async fn ensure_identity(
        &self,
        credentials: &Credentials,
        role: Role,
    ) -> AuthResult<Identity> {
        match self.create(credentials, role).await {
            Err(AuthError::AlreadyExists(username)) => {
                debug!("Identity '{}' already present", username);
                self.store
                    .find_by_username(&username)
                    .await?
                    .ok_or_else(|| {
                        AuthError::Storage(format!(
                            "identity '{}' vanished after conflict",
                            username
                        ))
                    })
            }
            other => other,
        }
    }

    async fn create(&self, credentials: &Credentials, role: Role) -> AuthResult<Identity> {
        if !credentials.is_complete() {
            debug!("Registration failed: missing credentials");
            return Err(AuthError::MissingCredentials);
        }

        let username = credentials.username.trim();

        if self.store.exists_by_username(username).await? {
            debug!("Registration failed: username '{}' already exists", username);
            return Err(AuthError::AlreadyExists(username.to_string()));
        }

        let password_hash =
            hash_off_thread(self.hasher.clone(), credentials.password.clone()).await?;
        let identity = self
            .store
            .save(Identity::new(username, password_hash, role))
            .await?;

        info!(username = %identity.username, role = %identity.role, "Registered new identity");
        Ok(identity)
    }
}
