//! Bus error types.

use crate::event::EventKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Unexpected payload for {kind}: expected {expected}")]
    UnexpectedPayload {
        kind: EventKind,
        expected: &'static str,
    },

    #[error("Handler rejected {kind} event: {reason}")]
    Rejected { kind: EventKind, reason: String },
}

pub type BusResult<T> = Result<T, BusError>;
