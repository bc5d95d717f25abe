//! Error types for the exporter.

use thiserror::Error;

/// Errors that can occur in the exporter core.
#[derive(Error, Debug)]
pub enum ExporterError {
    /// The update_engine status source could not be constructed.
    #[error("Failed to connect to update engine: {0}")]
    SourceUnavailable(String),

    /// The status source stopped delivering events without being cancelled.
    #[error("Status source closed: {0}")]
    SourceClosed(String),

    /// An event carried an operation outside the known set.
    #[error("Unknown update operation: {0}")]
    UnknownOperation(String),

    /// The configured listen address is not usable.
    #[error("Invalid listen address: {0}")]
    InvalidListenAddress(String),

    /// Metric registration or encoding failed.
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Encoded metrics were not valid UTF-8.
    #[error("Failed to encode metrics: {0}")]
    Encoding(String),

    /// I/O error (notify socket, listener).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;
