//! Error types for the connwatch engine
//!
//! Errors never escape the monitor's background paths; they are converted to
//! failed probe evidence or logged. They do surface from constructors,
//! configuration validation and the trait implementations in other crates.

use thiserror::Error;

/// Result type alias for connwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the connwatch engine
#[derive(Error, Debug)]
pub enum Error {
    /// A connectivity probe failed
    #[error("Probe error ({probe}): {message}")]
    Probe {
        /// Probe name
        probe: String,
        /// Error message
        message: String,
    },

    /// A platform adapter or native tool failed
    #[error("Platform error: {0}")]
    Platform(String),

    /// Interface enumeration failed
    #[error("Interface enumeration error: {0}")]
    Interfaces(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation exceeded its time budget
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// I/O errors (sockets, subprocesses, sysfs)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a probe error
    pub fn probe(probe: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Probe {
            probe: probe.into(),
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    /// Create an interface enumeration error
    pub fn interfaces(msg: impl Into<String>) -> Self {
        Self::Interfaces(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        let err = Error::probe("dns", "no resolver answered");
        assert_eq!(err.to_string(), "Probe error (dns): no resolver answered");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "nmcli");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
