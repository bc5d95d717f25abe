//! Error types for host fact collection.

use thiserror::Error;

/// Errors that can occur while reading host facts.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// No os-release file could be read.
    #[error("Failed to read os-release: {0}")]
    OsReleaseUnavailable(String),

    /// The os-release file was read but lacks a required key.
    #[error("os-release is missing key {0}")]
    MissingKey(&'static str),

    /// The kernel release could not be determined.
    #[error("Kernel release not available: {0}")]
    KernelUnavailable(String),

    /// Host uptime could not be determined.
    #[error("Uptime not available: {0}")]
    UptimeUnavailable(String),
}

/// Result type alias for host fact operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;
