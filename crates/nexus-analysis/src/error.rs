//! Analysis error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Empty keyword in {0} list")]
    EmptyKeyword(&'static str),

    #[error("Keyword '{0}' is both positive and negative")]
    OverlappingKeyword(String),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
