//! Unified logging system
//!
//! Structured logging on `tracing` with configurable output

use crate::error::{ErrorContext, PortcullisError, PortcullisResult};
use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Whether to include file and line information
    pub include_location: bool,
    /// Whether to include thread information
    pub include_thread: bool,
    /// Extra filter directives applied on top of `level`, e.g. `tower_http=debug`
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
            filter_directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Build the filter: `RUST_LOG` wins, otherwise `level` plus the directives
    fn env_filter(&self) -> PortcullisResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        let mut filter = EnvFilter::new(&self.level);
        for directive in &self.filter_directives {
            let directive = directive.parse().map_err(|e| PortcullisError::Config {
                message: format!("Invalid log directive '{}': {}", directive, e),
                source: None,
                context: ErrorContext::new("logging").with_operation("parse_directive"),
            })?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Initialize the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> PortcullisResult<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter()?);
    let base = fmt::layer()
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread)
        .with_writer(io::stdout);

    let result = match config.format {
        LogFormat::Json => registry.with(base.json()).try_init(),
        LogFormat::Pretty => registry.with(base.pretty()).try_init(),
        LogFormat::Compact => registry.with(base.compact()).try_init(),
    };

    result.map_err(|e| PortcullisError::Internal {
        message: format!("Failed to install tracing subscriber: {}", e),
        context: ErrorContext::new("logging").with_operation("init"),
    })
}
