//! Archon error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchonError {
    #[error("No market context available")]
    NoContext,

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
}

pub type ArchonResult<T> = Result<T, ArchonError>;
