//! Configuration management

use crate::config_error;
use crate::error::{PortcullisError, PortcullisResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What to do when a login would exceed the per-identity session cap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLimitPolicy {
    /// Refuse the new login; existing sessions stay active
    #[default]
    RejectNew,
    /// Invalidate the oldest sessions to make room for the new one
    EvictOldest,
}

impl std::str::FromStr for SessionLimitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "reject_new" => Ok(SessionLimitPolicy::RejectNew),
            "evict_oldest" => Ok(SessionLimitPolicy::EvictOldest),
            _ => Err(format!("Unknown session limit policy: {}", s)),
        }
    }
}

/// Session authority settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrent sessions per identity
    pub max_sessions: usize,
    /// Behavior once `max_sessions` is reached
    pub on_limit: SessionLimitPolicy,
    /// Idle timeout in seconds
    pub ttl_secs: u64,
    /// How often expired sessions are swept
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1,
            on_limit: SessionLimitPolicy::RejectNew,
            ttl_secs: 30 * 60,
            cleanup_interval_secs: 5 * 60,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Registration workflow settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Report duplicate usernames back to the join form instead of silently
    /// redirecting to the login page
    pub surface_duplicate_registration: bool,
}

/// Administrator identity created at startup when absent
#[derive(Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BootstrapAdmin {
    /// Read `PORTCULLIS_ADMIN_USERNAME` / `PORTCULLIS_ADMIN_PASSWORD`
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("PORTCULLIS_ADMIN_USERNAME").ok()?;
        let password = std::env::var("PORTCULLIS_ADMIN_PASSWORD").ok()?;
        Some(Self { username, password })
    }
}

/// Top-level Portcullis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortcullisConfig {
    pub session: SessionConfig,
    pub registration: RegistrationConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub logging: LoggingConfig,
}

impl PortcullisConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PortcullisResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PortcullisError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: PortcullisConfig =
            toml::from_str(&content).map_err(|e| PortcullisError::Config {
                message: format!("Failed to parse config: {}", e),
                source: Some(Box::new(e)),
                context: crate::ErrorContext::new("config")
                    .with_operation("parse_toml")
                    .with_suggestion("Check TOML syntax in config file"),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> PortcullisResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| PortcullisError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill `bootstrap_admin` from the environment when the file left it unset
    pub fn with_env_overrides(mut self) -> Self {
        if self.bootstrap_admin.is_none() {
            self.bootstrap_admin = BootstrapAdmin::from_env();
        }
        if let Some(policy) = std::env::var("PORTCULLIS_SESSION_ON_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.session.on_limit = policy;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> PortcullisResult<()> {
        if self.session.max_sessions == 0 {
            return Err(config_error!(
                "session.max_sessions must be at least 1",
                "config"
            ));
        }

        if self.session.ttl_secs == 0 {
            return Err(config_error!(
                "session.ttl_secs must be greater than 0",
                "config"
            ));
        }

        if self.session.cleanup_interval_secs == 0 {
            return Err(config_error!(
                "session.cleanup_interval_secs must be greater than 0",
                "config"
            ));
        }

        if let Some(admin) = &self.bootstrap_admin {
            if admin.username.trim().is_empty() || admin.password.is_empty() {
                return Err(config_error!(
                    "bootstrap_admin requires a username and a password",
                    "config"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_single_session_reject_policy() {
        let config = PortcullisConfig::default();

        assert_eq!(config.session.max_sessions, 1);
        assert_eq!(config.session.on_limit, SessionLimitPolicy::RejectNew);
        assert_eq!(config.session.ttl(), Duration::from_secs(1800));
        assert!(!config.registration.surface_duplicate_registration);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PortcullisConfig = toml::from_str(
            r#"
            [session]
            on_limit = "evict_oldest"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.on_limit, SessionLimitPolicy::EvictOldest);
        assert_eq!(config.session.max_sessions, 1);
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_zero_session_cap_is_rejected() {
        let mut config = PortcullisConfig::default();
        config.session.max_sessions = 0;

        assert!(matches!(
            config.validate(),
            Err(PortcullisError::Config { .. })
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portcullis.toml");

        let mut config = PortcullisConfig::default();
        config.session.max_sessions = 3;
        config.bootstrap_admin = Some(BootstrapAdmin {
            username: "root".to_string(),
            password: "changeme".to_string(),
        });
        config.save_to_file(&path).unwrap();

        let loaded = PortcullisConfig::from_file(&path).unwrap();
        assert_eq!(loaded.session.max_sessions, 3);
        assert_eq!(loaded.bootstrap_admin.unwrap().username, "root");
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "evict-oldest".parse::<SessionLimitPolicy>().unwrap(),
            SessionLimitPolicy::EvictOldest
        );
        assert!("drop_all".parse::<SessionLimitPolicy>().is_err());
        assert_eq!(SessionLimitPolicy::default(), SessionLimitPolicy::RejectNew);
    }

    #[test]
    fn test_bootstrap_admin_debug_hides_password() {
        let admin = BootstrapAdmin {
            username: "root".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", admin).contains("hunter2"));
    }
}
