//! Error types for overlay-tracker.

use thiserror::Error;

/// Result type for overlay-tracker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tracker operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The topology rejected its configuration.
    #[error("topology error: {0}")]
    Topology(#[from] overlay_topology::Error),

    /// Malformed configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A stream part id could not be parsed.
    #[error("invalid stream part id: {0}")]
    InvalidStreamPart(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
