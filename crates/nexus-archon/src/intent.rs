//! Keyword intent classification.

use std::fmt;

/// What the user is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    PriceQuery,
    TradeIntent,
    TrendAnalysis,
    RiskAssessment,
    Prediction,
    PatternRecognition,
    GeneralQuery,
}

/// Checked in order; the first hit wins.
const RULES: &[(Intent, &[&str])] = &[
    (Intent::PriceQuery, &["price", "cost"]),
    (Intent::TradeIntent, &["buy", "sell"]),
    (Intent::TrendAnalysis, &["trend", "direction"]),
    (Intent::RiskAssessment, &["risk"]),
    (Intent::Prediction, &["predict", "forecast"]),
    (Intent::PatternRecognition, &["pattern"]),
];

impl Intent {
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map_or(Self::GeneralQuery, |(intent, _)| *intent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceQuery => "price_query",
            Self::TradeIntent => "trade_intent",
            Self::TrendAnalysis => "trend_analysis",
            Self::RiskAssessment => "risk_assessment",
            Self::Prediction => "prediction",
            Self::PatternRecognition => "pattern_recognition",
            Self::GeneralQuery => "general_query",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Intent::classify("What's the BTC price?"), Intent::PriceQuery);
        assert_eq!(Intent::classify("how much does it cost"), Intent::PriceQuery);
        assert_eq!(Intent::classify("Should I SELL?"), Intent::TradeIntent);
        assert_eq!(Intent::classify("market direction"), Intent::TrendAnalysis);
        assert_eq!(Intent::classify("risk level"), Intent::RiskAssessment);
        assert_eq!(Intent::classify("forecast eth"), Intent::Prediction);
        assert_eq!(Intent::classify("any patterns?"), Intent::PatternRecognition);
        assert_eq!(Intent::classify("hello"), Intent::GeneralQuery);
    }

    #[test]
    fn test_priority_order() {
        // price beats buy, buy beats trend
        assert_eq!(Intent::classify("buy at this price?"), Intent::PriceQuery);
        assert_eq!(Intent::classify("buy into the trend"), Intent::TradeIntent);
        assert_eq!(Intent::classify("predict the risk"), Intent::RiskAssessment);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(Intent::GeneralQuery.to_string(), "general_query");
        assert_eq!(Intent::PatternRecognition.as_str(), "pattern_recognition");
    }
}
