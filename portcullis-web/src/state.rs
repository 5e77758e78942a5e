//! Application state and composition root

use crate::{WebConfig, WebResult};
use portcullis_core::{
    AccessPolicy, CredentialStore, Credentials, MemoryCredentialStore, PasswordEncoder,
    PortcullisConfig, RegistrationService, Role, SessionAuthority,
};
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "sqlite")]
use crate::auth::database::SqliteCredentialStore;

/// Shared state handed to every handler and middleware
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: WebConfig,
    /// Session, registration and logging settings
    pub settings: Arc<PortcullisConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub registration: RegistrationService,
    pub sessions: SessionAuthority,
    pub policy: Arc<AccessPolicy>,
}

impl AppState {
    /// Create state, loading settings from `config.config_path` and the environment
    pub async fn new(config: WebConfig) -> WebResult<Self> {
        let settings = config.load_settings()?;
        Self::with_settings(config, settings).await
    }

    /// Create state from already loaded settings
    pub async fn with_settings(config: WebConfig, settings: PortcullisConfig) -> WebResult<Self> {
        let store = Self::open_store(&config).await?;
        let encoder = PasswordEncoder::new();

        let registration = RegistrationService::new(store.clone(), encoder.clone());
        let sessions = SessionAuthority::new(store.clone(), encoder, &settings.session);
        let policy = AccessPolicy::standard();

        if let Some(admin) = &settings.bootstrap_admin {
            let identity = registration
                .ensure_identity(
                    &Credentials::new(admin.username.as_str(), admin.password.as_str()),
                    Role::Admin,
                )
                .await?;
            info!(username = %identity.username, role = %identity.role, "Bootstrap administrator ready");
        }

        info!(
            max_sessions = settings.session.max_sessions,
            on_limit = ?sessions.policy(),
            rules = policy.rules().len(),
            "Application state initialized successfully"
        );

        Ok(Self {
            config,
            settings: Arc::new(settings),
            store,
            registration,
            sessions,
            policy: Arc::new(policy),
        })
    }

    #[cfg(feature = "sqlite")]
    async fn open_store(config: &WebConfig) -> WebResult<Arc<dyn CredentialStore>> {
        match &config.database_url {
            Some(url) => {
                let store = SqliteCredentialStore::connect(url).await?;
                info!("Using SQLite credential store");
                Ok(Arc::new(store))
            }
            None => {
                info!("No database configured, using in-memory credential store");
                Ok(Arc::new(MemoryCredentialStore::new()))
            }
        }
    }

    #[cfg(not(feature = "sqlite"))]
    async fn open_store(config: &WebConfig) -> WebResult<Arc<dyn CredentialStore>> {
        if config.database_url.is_some() {
            tracing::warn!("Built without the sqlite feature, ignoring database_url");
        }
        Ok(Arc::new(MemoryCredentialStore::new()))
    }

    /// Drop idle sessions; run periodically by the server
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let purged = self.sessions.purge_expired().await;
        if purged > 0 {
            info!(purged, "Removed expired sessions");
        }
        purged
    }
}
