//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid data: {0}")]
    InvalidData(#[from] nexus_core::CoreError),

    #[error("Stale candle for {symbol}: ts={timestamp} is not after last={last}")]
    StaleCandle {
        symbol: String,
        timestamp: i64,
        last: i64,
    },
}

pub type FeedResult<T> = Result<T, FeedError>;
