//! In-memory credential store

use crate::error::{AuthError, AuthResult};
use crate::traits::CredentialStore;
use crate::types::Identity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Credential store backed by a `HashMap` (development and testing)
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    users: Arc<RwLock<HashMap<String, Identity>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn exists_by_username(&self, username: &str) -> AuthResult<bool> {
        Ok(self.users.read().await.contains_key(username))
    }

    async fn save(&self, identity: Identity) -> AuthResult<Identity> {
        let mut users = self.users.write().await;

        if users.contains_key(&identity.username) {
            return Err(AuthError::AlreadyExists(identity.username));
        }

        users.insert(identity.username.clone(), identity.clone());
        debug!("Stored identity: {}", identity.username);
        Ok(identity)
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Identity>> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn count(&self) -> AuthResult<usize> {
        Ok(self.users.read().await.len())
    }
}
