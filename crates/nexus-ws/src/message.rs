//! Upstream feed message types.
//!
//! Payloads are tagged by the `e` field. Only `trade` and `24hrTicker`
//! (alias `ticker`) are recognized; anything else fails to decode and is
//! dropped by the connection.

use crate::error::{WsError, WsResult};
use nexus_core::{MarketTick, Side, Trade};
use serde::{Deserialize, Deserializer};

/// Numeric field that may arrive as a JSON number or a decimal string.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    de_f64(deserializer).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(u64),
    String(String),
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match IdValue::deserialize(deserializer)? {
        IdValue::Number(n) => n.to_string(),
        IdValue::String(s) => s,
    })
}

/// Raw trade payload.
/// Format: {"e": "trade", "t": 12345, "s": "BTCUSDT", "p": "0.001", "q": "100", "m": true, "T": 123456785}
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    #[serde(rename = "t", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(rename = "q", deserialize_with = "de_f64")]
    pub quantity: f64,
    /// Buyer is the maker.
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
    #[serde(rename = "T")]
    pub trade_time: i64,
}

/// Raw 24h ticker payload.
/// Format: {"e": "24hrTicker", "E": 123456789, "s": "BTCUSDT", "P": "2.5", "c": "0.0025", "h": ..., "l": ..., "v": ..., "q": ...}
#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c", deserialize_with = "de_f64")]
    pub close: f64,
    #[serde(rename = "v", deserialize_with = "de_f64")]
    pub volume: f64,
    #[serde(rename = "P", deserialize_with = "de_f64")]
    pub change_pct: f64,
    #[serde(rename = "h", deserialize_with = "de_f64")]
    pub high: f64,
    #[serde(rename = "l", deserialize_with = "de_f64")]
    pub low: f64,
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Quote asset volume, when the venue sends it.
    #[serde(rename = "q", default, deserialize_with = "de_opt_f64")]
    pub quote_volume: Option<f64>,
}

/// Tagged upstream message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "e")]
pub enum FeedMessage {
    #[serde(rename = "trade")]
    Trade(RawTrade),
    #[serde(rename = "24hrTicker", alias = "ticker")]
    Ticker(RawTicker),
}

/// Normalized update ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Trade(Trade),
    Tick(MarketTick),
}

impl RawTrade {
    /// Convert to a domain trade.
    pub fn into_trade(self) -> WsResult<Trade> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(WsError::ParseError(format!(
                "trade {} has invalid price {}",
                self.id, self.price
            )));
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(WsError::ParseError(format!(
                "trade {} has invalid quantity {}",
                self.id, self.quantity
            )));
        }
        Ok(Trade {
            id: self.id,
            symbol: self.symbol,
            price: self.price,
            volume: self.quantity,
            side: Side::from_buyer_maker(self.buyer_is_maker),
            timestamp: self.trade_time,
        })
    }
}

impl RawTicker {
    /// Convert to a complete tick.
    ///
    /// The ticker carries no sentiment or liquidity, so both are derived:
    /// sentiment is the 24h change scaled by 1/10 and clamped to [-1, 1],
    /// liquidity is the quote volume (or price x volume when absent).
    pub fn into_tick(self) -> WsResult<MarketTick> {
        let liquidity = self
            .quote_volume
            .unwrap_or(self.close * self.volume);
        let tick = MarketTick {
            symbol: self.symbol,
            price: self.close,
            volume: self.volume,
            timestamp: self.event_time,
            change_24h: self.change_pct,
            high_24h: self.high,
            low_24h: self.low,
            sentiment: (self.change_pct / 10.0).clamp(-1.0, 1.0),
            liquidity,
        };
        tick.validate()?;
        Ok(tick)
    }
}

impl FeedMessage {
    pub fn normalize(self) -> WsResult<FeedUpdate> {
        match self {
            Self::Trade(raw) => raw.into_trade().map(FeedUpdate::Trade),
            Self::Ticker(raw) => raw.into_tick().map(FeedUpdate::Tick),
        }
    }
}

/// Decode and normalize one text frame.
pub fn decode_feed_message(text: &str) -> WsResult<FeedUpdate> {
    let msg: FeedMessage = serde_json::from_str(text)?;
    msg.normalize()
}
