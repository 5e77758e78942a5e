//! Portcullis Web Server
//!
//! Server-rendered login, registration and role-gated pages on top of
//! `portcullis-core`. Every request passes through the access control
//! middleware before it reaches a handler.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod templates;

// Re-export main types
pub use server::{PortcullisServer, PortcullisServerBuilder};
pub use state::AppState;

use askama::Template;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    Router,
};
use portcullis_core::{AuthError, PortcullisConfig, PortcullisError};
use std::path::PathBuf;
use templates::ErrorTemplate;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::page_routes())
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::access_control,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024)) // Forms only
        .with_state(state)
}

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL; the in-memory credential store is used when unset
    pub database_url: Option<String>,
    /// Mark cookies `Secure` (deployments behind TLS)
    pub secure_cookies: bool,
    /// Path to a TOML file with session, registration and logging settings
    pub config_path: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: None,
            secure_cookies: false,
            config_path: None,
        }
    }
}

impl WebConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("PORTCULLIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORTCULLIS_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            database_url: std::env::var("DATABASE_URL").ok(),
            secure_cookies: std::env::var("PORTCULLIS_SECURE_COOKIES")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            config_path: std::env::var("PORTCULLIS_CONFIG").ok().map(PathBuf::from),
        }
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Read the policy settings from `config_path` (defaults when unset),
    /// then apply environment overrides
    pub fn load_settings(&self) -> WebResult<PortcullisConfig> {
        let settings = match &self.config_path {
            Some(path) => PortcullisConfig::from_file(path)?,
            None => PortcullisConfig::default(),
        };

        let settings = settings.with_env_overrides();
        settings.validate()?;
        Ok(settings)
    }
}

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Invalid or missing CSRF token")]
    Csrf,

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(#[from] PortcullisError),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;

impl WebError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            WebError::Auth(AuthError::Forbidden) => (
                StatusCode::FORBIDDEN,
                "You do not have permission to view this page.".to_string(),
            ),
            WebError::Csrf => (
                StatusCode::FORBIDDEN,
                "The form has expired or was not submitted from this site.".to_string(),
            ),
            WebError::Auth(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if let WebError::Auth(AuthError::Unauthenticated) = self {
            return Redirect::to("/login").into_response();
        }

        let (status, message) = self.status_and_message();
        if let WebError::Config(e) = &self {
            e.log();
        } else if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        match ErrorTemplate::new(status.as_u16(), message.clone()).render() {
            Ok(body) => (status, Html(body)).into_response(),
            Err(e) => {
                error!("Failed to render error page: {}", e);
                (status, message).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            WebError::Auth(AuthError::Forbidden).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(WebError::Csrf.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            WebError::Auth(AuthError::Storage("down".to_string()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            WebError::Auth(AuthError::Unauthenticated)
                .into_response()
                .status(),
            StatusCode::SEE_OTHER
        );
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let config = WebConfig {
            config_path: Some(PathBuf::from("/nonexistent/portcullis.toml")),
            ..WebConfig::default()
        };

        assert!(matches!(config.load_settings(), Err(WebError::Config(_))));
    }
}
