//! # Error Types
//!
//! Custom error types for FPV Power Monitor using `thiserror`.

use thiserror::Error;

/// Main error type for FPV Power Monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration value out of its valid range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file is not valid TOML
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading source failed to produce a reading
    #[error("Reading source error: {0}")]
    Source(String),

    /// Reading rejected before publication (NaN, infinite, implausible)
    #[error("Malformed reading: {0}")]
    MalformedReading(String),

    /// Notification sink failed to deliver a message
    #[error("Notification error: {0}")]
    Notify(String),

    /// Programming error detected at runtime
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// `start()` called on a pipeline that is already running
    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// `stop()` called on a pipeline that is not running
    #[error("Pipeline is not running")]
    NotRunning,
}

impl MonitorError {
    /// Whether this error should abort start-up (as opposed to a per-tick failure)
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ConfigParse(_))
    }
}

/// Result type alias for FPV Power Monitor
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_classified() {
        assert!(MonitorError::Config("bad".into()).is_config());
        assert!(!MonitorError::Source("timeout".into()).is_config());
        assert!(!MonitorError::AlreadyRunning.is_config());
    }

    #[test]
    fn test_error_messages() {
        let err = MonitorError::MalformedReading("voltage is NaN".into());
        assert_eq!(err.to_string(), "Malformed reading: voltage is NaN");
        assert_eq!(MonitorError::AlreadyRunning.to_string(), "Pipeline is already running");
    }
}
