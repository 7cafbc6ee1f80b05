//! Stateless analysis engines for nexus.
//!
//! - Candlestick and trend pattern recognition over a candle sequence
//! - Keyword and price-action sentiment scoring

pub mod error;
pub mod pattern;
pub mod sentiment;

pub use error::{AnalysisError, AnalysisResult};
pub use pattern::{detect_all, detect_candle_patterns, detect_trend_patterns};
pub use sentiment::{SentimentAnalyzer, SentimentReading, SentimentSource};
