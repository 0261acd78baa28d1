//! Error types for overlay-topology.

use thiserror::Error;

/// Result type for overlay-topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when building an overlay topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The configured neighbor limit is zero or negative.
    #[error("maxNeighborsPerNode must be a positive integer, got {0}")]
    InvalidMaxNeighbors(i64),
}
