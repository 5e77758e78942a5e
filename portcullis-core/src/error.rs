//! Unified error handling system
//!
//! Two layers: [`AuthError`] is the per-request taxonomy returned by the
//! credential, session and policy operations. [`PortcullisError`] carries
//! process-level failures (configuration, IO) with an [`ErrorContext`] for
//! tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type PortcullisResult<T> = Result<T, PortcullisError>;

pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication and authorization failures.
///
/// None of these are fatal to the process; each one ends a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Username already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Maximum concurrent sessions reached for: {0}")]
    SessionLimitExceeded(String),

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Access denied")]
    Forbidden,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Credential store error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Short machine-readable code, used in redirects and log fields
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AlreadyExists(_) => "exists",
            AuthError::InvalidCredentials => "invalid",
            AuthError::SessionLimitExceeded(_) => "session_limit",
            AuthError::MissingCredentials => "missing",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Forbidden => "forbidden",
            AuthError::Hashing(_) => "hashing",
            AuthError::Storage(_) => "storage",
        }
    }

    /// Whether the failure was caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AuthError::Hashing(_) | AuthError::Storage(_))
    }
}

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Infrastructure error type for Portcullis
#[derive(Error, Debug)]
pub enum PortcullisError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        context: ErrorContext,
    },
}

impl PortcullisError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            PortcullisError::Config { context, .. } => Some(context),
            PortcullisError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            PortcullisError::Auth(e) if e.is_client_error() => {
                warn!(error = %self, "Authentication error");
            }
            PortcullisError::Config { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration error"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::PortcullisError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file"),
        }
    };
}
