//! Error types for nexus-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid tick: {0}")]
    InvalidTick(String),

    #[error("Invalid candle: {0}")]
    InvalidCandle(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
