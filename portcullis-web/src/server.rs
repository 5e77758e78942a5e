//! Portcullis Web Server
//!
//! Main web server implementation using Axum.

use crate::{create_app, AppState, WebConfig, WebError, WebResult};
use axum::serve;
use portcullis_core::PortcullisConfig;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Main Portcullis web server
pub struct PortcullisServer {
    config: WebConfig,
    state: AppState,
}

impl PortcullisServer {
    /// Create a new server, loading settings from the config file and environment
    pub async fn new(config: WebConfig) -> WebResult<Self> {
        let state = AppState::new(config.clone()).await?;

        Ok(Self { config, state })
    }

    /// Create a new server from already loaded settings
    pub async fn with_settings(config: WebConfig, settings: PortcullisConfig) -> WebResult<Self> {
        let state = AppState::with_settings(config.clone(), settings).await?;

        Ok(Self { config, state })
    }

    /// Start the web server
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.address();

        info!("Starting Portcullis Web Server");
        info!("Server address: http://{}", address);

        // Create the application
        let app = create_app(self.state.clone());

        // Create TCP listener
        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;

        info!("Server listening on http://{}", address);

        // Sweep idle sessions
        let cleanup_state = self.state.clone();
        let cleanup_interval = self.state.settings.session.cleanup_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                interval.tick().await;
                cleanup_state.cleanup_expired_sessions().await;
            }
        });

        // Start the server
        if let Err(e) = serve(listener, app).await {
            error!("Server error: {}", e);
            return Err(WebError::Server(e));
        }

        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Builder for PortcullisServer
pub struct PortcullisServerBuilder {
    config: WebConfig,
    settings: Option<PortcullisConfig>,
}

impl PortcullisServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            config: WebConfig::default(),
            settings: None,
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: WebConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set database URL
    pub fn database_url<S: Into<String>>(mut self, database_url: S) -> Self {
        self.config.database_url = Some(database_url.into());
        self
    }

    /// Mark cookies `Secure`
    pub fn secure_cookies(mut self, secure: bool) -> Self {
        self.config.secure_cookies = secure;
        self
    }

    /// Use these settings instead of loading them from `config_path`
    pub fn settings(mut self, settings: PortcullisConfig) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Build the server
    pub async fn build(self) -> WebResult<PortcullisServer> {
        match self.settings {
            Some(settings) => PortcullisServer::with_settings(self.config, settings).await,
            None => PortcullisServer::new(self.config).await,
        }
    }
}

impl Default for PortcullisServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_creation() {
        let server = PortcullisServerBuilder::new()
            .settings(PortcullisConfig::default())
            .build()
            .await;
        assert!(server.is_ok());
    }

    #[test]
    fn test_server_builder() {
        let builder = PortcullisServerBuilder::new()
            .host("localhost")
            .port(3000)
            .secure_cookies(true);

        assert_eq!(builder.config.host, "localhost");
        assert_eq!(builder.config.port, 3000);
        assert!(builder.config.secure_cookies);
    }

    #[test]
    fn test_config_defaults() {
        let config = WebConfig::default();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert!(config.database_url.is_none());
        assert!(!config.secure_cookies);
    }
}
