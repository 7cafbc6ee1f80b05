//! Normalized market data types.
//!
//! Everything here is produced at the ingestion boundary (ticker/trade
//! decode) or by the candle builder, and consumed read-only downstream.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Latest known state of one symbol.
///
/// The store keeps exactly one of these per symbol and replaces it whole
/// on every tick, so producers must always fill every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTick {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    /// Exchange event time (ms since epoch).
    pub timestamp: i64,
    /// 24h change in percent.
    pub change_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    /// Sentiment in [-1, 1].
    pub sentiment: f64,
    pub liquidity: f64,
}

impl MarketTick {
    /// 24h range as a percentage of the current price.
    ///
    /// Returns 0 for a non-positive price.
    pub fn range_pct(&self) -> f64 {
        if self.price <= 0.0 {
            return 0.0;
        }
        (self.high_24h - self.low_24h) / self.price * 100.0
    }

    /// Check the tick is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(CoreError::InvalidTick("empty symbol".to_string()));
        }
        let numbers = [
            self.price,
            self.volume,
            self.change_24h,
            self.high_24h,
            self.low_24h,
            self.sentiment,
            self.liquidity,
        ];
        if numbers.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidTick(format!(
                "{}: non-finite field",
                self.symbol
            )));
        }
        if self.price < 0.0 || self.volume < 0.0 {
            return Err(CoreError::InvalidTick(format!(
                "{}: negative price or volume",
                self.symbol
            )));
        }
        if !(-1.0..=1.0).contains(&self.sentiment) {
            return Err(CoreError::InvalidTick(format!(
                "{}: sentiment {} out of range",
                self.symbol, self.sentiment
            )));
        }
        Ok(())
    }
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Derive the aggressor side from a "buyer is maker" flag.
    ///
    /// When the buyer is the maker the seller crossed the spread.
    pub fn from_buyer_maker(buyer_is_maker: bool) -> Self {
        if buyer_is_maker {
            Self::Sell
        } else {
            Self::Buy
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub side: Side,
    /// Trade time (ms since epoch).
    pub timestamp: i64,
}

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket open time (ms since epoch).
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Open a candle from the first trade of a bucket.
    pub fn from_trade(timestamp: i64, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Fold another trade into this candle.
    pub fn update(&mut self, price: f64, volume: f64) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume += volume;
    }

    /// Absolute body size.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// High-low range.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        (self.high - self.open.max(self.close)).abs()
    }

    pub fn lower_wick(&self) -> f64 {
        (self.low - self.open.min(self.close)).abs()
    }

    /// Close strictly above open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Validate OHLCV invariants.
    pub fn validate(&self) -> Result<()> {
        let ok = self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0;
        if ok {
            Ok(())
        } else {
            Err(CoreError::InvalidCandle(format!(
                "ts={} o={} h={} l={} c={} v={}",
                self.timestamp, self.open, self.high, self.low, self.close, self.volume
            )))
        }
    }
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub volume: f64,
    /// Cumulative volume up to and including this level.
    pub total: f64,
}

/// Order book snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub timestamp: i64,
}
