//! Analysis and conversation outputs.

use crate::market::MarketTick;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall market direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Directional bias of a detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternBias {
    Bullish,
    Bearish,
    Neutral,
}

impl From<Trend> for PatternBias {
    fn from(trend: Trend) -> Self {
        match trend {
            Trend::Bullish => Self::Bullish,
            Trend::Bearish => Self::Bearish,
            Trend::Neutral => Self::Neutral,
        }
    }
}

/// A detected chart or market pattern.
///
/// Patterns are produced on demand and carry no identity beyond their id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub bias: PatternBias,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub timeframe: String,
    pub description: String,
    pub implications: Vec<String>,
}

impl Pattern {
    /// Build a pattern whose id is `{slug}-{now_ms}`.
    pub fn new(
        slug: &str,
        name: &str,
        bias: PatternBias,
        confidence: f64,
        timeframe: &str,
        description: &str,
        implications: &[&str],
    ) -> Self {
        Self {
            id: format!("{slug}-{}", Utc::now().timestamp_millis()),
            name: name.to_string(),
            bias,
            confidence,
            timeframe: timeframe.to_string(),
            description: description.to_string(),
            implications: implications.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Predicted price direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Sideways,
}

impl From<Trend> for Direction {
    fn from(trend: Trend) -> Self {
        match trend {
            Trend::Bullish => Self::Up,
            Trend::Bearish => Self::Down,
            Trend::Neutral => Self::Sideways,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Sideways => write!(f, "sideways"),
        }
    }
}

/// Price prediction for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub symbol: String,
    pub timeframe: String,
    pub direction: Direction,
    pub target_price: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub risks: Vec<String>,
}

/// Aggregate market state derived from the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketMood {
    pub trend: Trend,
    /// Mean 24h range in percent of price (>= 0).
    pub volatility: f64,
    /// In [-1, 1].
    pub sentiment: f64,
}

/// Snapshot of the market used for one reasoning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketContext {
    pub market_state: MarketMood,
    pub user_intent: String,
    pub relevant_data: Vec<MarketTick>,
    /// In [0, 1].
    pub confidence: f64,
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Archon,
    System,
}

/// One message in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchonMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// ms since epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MarketContext>,
}

impl ArchonMessage {
    /// Create a message stamped with the current time.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<MarketContext>) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_id_prefix() {
        let p = Pattern::new(
            "doji",
            "Doji",
            PatternBias::Neutral,
            0.8,
            "1H",
            "Indecision",
            &["Wait"],
        );
        assert!(p.id.starts_with("doji-"));
        assert_eq!(p.implications, vec!["Wait".to_string()]);
    }

    #[test]
    fn test_pattern_serializes_bias_as_type() {
        let p = Pattern::new("x", "X", PatternBias::Bullish, 0.5, "4H", "d", &[]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "bullish");
    }

    #[test]
    fn test_direction_from_trend() {
        assert_eq!(Direction::from(Trend::Bullish), Direction::Up);
        assert_eq!(Direction::from(Trend::Bearish), Direction::Down);
        assert_eq!(Direction::from(Trend::Neutral), Direction::Sideways);
    }

    #[test]
    fn test_message_ids_unique() {
        let a = ArchonMessage::new(MessageRole::User, "hi");
        let b = ArchonMessage::new(MessageRole::User, "hi");
        assert_ne!(a.id, b.id);
        assert!(a.context.is_none());
    }
}
