//! Cadence Logging
//!
//! One-call `tracing` subscriber setup. `RUST_LOG`, when set, overrides the
//! level passed in.

use std::fmt;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(String),
    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// `Debug` when verbose, `Info` otherwise.
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Self::Debug
        } else {
            Self::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the filter: `RUST_LOG` if set and valid, else `level` for everything.
pub fn filter_for(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives).map_err(|e| LoggingError::Filter(e.to_string()))
        }
        _ => EnvFilter::try_new(level.as_str()).map_err(|e| LoggingError::Filter(e.to_string())),
    }
}

/// Install the global fmt subscriber. Fails, rather than panicking, if one
/// is already installed.
pub fn try_init(level: LogLevel) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(level)?)
        .with_target(false)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_verbose() {
        assert_eq!(LogLevel::from_verbose(true), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbose(false), LogLevel::Info);
    }

    #[test]
    fn test_level_ordering_and_names() {
        assert!(LogLevel::Error < LogLevel::Trace);
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_second_init_is_an_error() {
        let _ = try_init(LogLevel::Info);
        assert!(matches!(try_init(LogLevel::Debug), Err(LoggingError::AlreadyInitialized(_))));
    }
}
