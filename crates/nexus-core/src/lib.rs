//! Core domain types for the nexus market intelligence pipeline.
//!
//! This crate provides the vocabulary shared by every component:
//! - `MarketTick`, `Trade`, `Candle`, `OrderBook`: normalized market data
//! - `Pattern`, `Prediction`, `Trend`: analysis outputs
//! - `ArchonMessage`, `Alert`: conversational and alerting records

pub mod alert;
pub mod error;
pub mod insight;
pub mod market;

pub use alert::{Alert, AlertKind, AlertSeverity};
pub use error::{CoreError, Result};
pub use insight::{
    ArchonMessage, Direction, MarketContext, MarketMood, MessageRole, Pattern, PatternBias,
    Prediction, Trend,
};
pub use market::{Candle, MarketTick, OrderBook, OrderBookLevel, Side, Trade};
