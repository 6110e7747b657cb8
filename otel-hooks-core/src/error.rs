//! Error types for otel-hooks-core

use thiserror::Error;

/// Main error type for the otel-hooks-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session state file could not be written
    #[error("state error: {0}")]
    State(String),

    /// A provider rejected an emit call
    #[error("provider error: {0}")]
    Provider(String),

    /// Exporting buffered spans to a backend failed
    #[error("export error: {0}")]
    Export(String),

    /// Logging could not be initialized
    #[error("logging error: {0}")]
    Logging(String),
}

/// Result type alias for otel-hooks-core
pub type Result<T> = std::result::Result<T, Error>;
