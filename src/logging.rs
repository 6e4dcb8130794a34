//! Logging setup
//!
//! The library only emits `tracing` events; binaries and tests choose how
//! to render them. [`init`] installs a global `tracing-subscriber` with an
//! `EnvFilter`, writing to stderr so that command output on stdout stays
//! machine readable.
//!
//! `RUST_LOG` takes precedence over the configured level:
//!
//! ```text
//! RUST_LOG=archival_import_sdk::persistence=trace archival-import import ...
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Errors while configuring logging
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    #[error("Invalid filter directive: {0}")]
    InvalidDirective(String),

    #[error("Logging already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Minimum level of events to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LogError::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Rendering of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Extra directives such as `archival_import_sdk::import=debug`
    pub filter_directives: Option<String>,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            filter_directives: None,
            include_targets: true,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.filter_directives = Some(directives.into());
        self
    }

    pub fn include_targets(mut self, include: bool) -> Self {
        self.include_targets = include;
        self
    }

    /// Build the event filter: `RUST_LOG` if set, else the configured
    /// level, plus any extra directives.
    pub fn env_filter(&self) -> Result<EnvFilter, LogError> {
        let mut filter = EnvFilter::builder()
            .with_default_directive(self.level.to_tracing_level().into())
            .from_env_lossy();
        if let Some(directives) = &self.filter_directives {
            for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                let parsed = directive
                    .parse()
                    .map_err(|_| LogError::InvalidDirective(directive.to_string()))?;
                filter = filter.add_directive(parsed);
            }
        }
        Ok(filter)
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init(config: &LogConfig) -> Result<(), LogError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(config.include_targets)
        .with_env_filter(filter);

    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| LogError::AlreadyInitialised(e.to_string()))
}
