//! Market state store for nexus.
//!
//! Single source of truth for current market beliefs:
//! - Latest full tick and order book per symbol
//! - Per-symbol candle history folded from trades
//! - Watch list, active symbol, alerts, patterns and conversation log
//!
//! The store is fed by event bus subscriptions and read by every
//! downstream consumer.

pub mod candles;
pub mod error;
pub mod store;

pub use candles::CandleSeries;
pub use error::{FeedError, FeedResult};
pub use store::{MarketStore, StoreConfig};
