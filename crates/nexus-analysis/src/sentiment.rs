//! Keyword and price-action sentiment scoring.

use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "moon", "pump", "buy", "long", "breakout", "rally", "surge", "gain", "profit",
    "win", "strong", "up", "green",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "dump", "sell", "short", "crash", "drop", "fall", "loss", "weak", "down", "red",
    "fear", "panic", "liquidation",
];

/// Keyword hits per unit of score.
const TEXT_SCALE: f64 = 10.0;
/// Samples needed for full confidence.
const FULL_CONFIDENCE_SAMPLES: f64 = 10.0;

/// One input to [`SentimentAnalyzer::aggregate_sentiment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSource {
    pub text: Option<String>,
    pub prices: Option<Vec<f64>>,
}

impl SentimentSource {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            prices: None,
        }
    }

    pub fn prices(prices: Vec<f64>) -> Self {
        Self {
            text: None,
            prices: Some(prices),
        }
    }
}

/// Aggregated sentiment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    /// Mean score in [-1, 1].
    pub overall: f64,
    /// Sample volume in [0, 1].
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct SentimentAnalyzer {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().map(|w| w.to_string()).collect(),
            negative: NEGATIVE_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl SentimentAnalyzer {
    /// Build an analyzer with custom keyword lists.
    ///
    /// Keywords are lowercased. The lists must be disjoint and contain no
    /// empty entries.
    pub fn with_keywords<P, N>(positive: P, negative: N) -> AnalysisResult<Self>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        let positive = normalize_keywords(positive, "positive")?;
        let negative = normalize_keywords(negative, "negative")?;

        if let Some(dup) = positive.iter().find(|w| negative.contains(w)) {
            return Err(AnalysisError::OverlappingKeyword(dup.clone()));
        }
        Ok(Self { positive, negative })
    }

    /// Keyword score of `text` in [-1, 1].
    ///
    /// Each non-overlapping occurrence of a positive keyword adds one, each
    /// negative occurrence subtracts one; the total is divided by ten.
    pub fn analyze_text(&self, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let hits = |words: &[String]| -> i64 {
            words
                .iter()
                .map(|w| lower.matches(w.as_str()).count() as i64)
                .sum()
        };
        let score = hits(&self.positive) - hits(&self.negative);
        (score as f64 / TEXT_SCALE).clamp(-1.0, 1.0)
    }

    /// `(up - down) / (up + down)` over consecutive moves, 0 if no moves.
    pub fn analyze_price_action(&self, prices: &[f64]) -> f64 {
        if prices.len() < 2 {
            return 0.0;
        }

        let (up, down) = prices.windows(2).fold((0u32, 0u32), |(up, down), w| {
            if w[1] > w[0] {
                (up + 1, down)
            } else if w[1] < w[0] {
                (up, down + 1)
            } else {
                (up, down)
            }
        });

        let total = up + down;
        if total == 0 {
            return 0.0;
        }
        (f64::from(up) - f64::from(down)) / f64::from(total)
    }

    /// Average every text and price sample across `sources`.
    ///
    /// An empty text is not a sample; a price list is, even when empty.
    pub fn aggregate_sentiment(&self, sources: &[SentimentSource]) -> SentimentReading {
        let mut total = 0.0;
        let mut count = 0usize;

        for source in sources {
            if let Some(text) = source.text.as_deref().filter(|t| !t.is_empty()) {
                total += self.analyze_text(text);
                count += 1;
            }
            if let Some(prices) = &source.prices {
                total += self.analyze_price_action(prices);
                count += 1;
            }
        }

        SentimentReading {
            overall: if count > 0 { total / count as f64 } else { 0.0 },
            confidence: (count as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0),
        }
    }
}

fn normalize_keywords<I>(words: I, list: &'static str) -> AnalysisResult<Vec<String>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for word in words {
        let word = word.as_ref().trim().to_lowercase();
        if word.is_empty() {
            return Err(AnalysisError::EmptyKeyword(list));
        }
        if !out.contains(&word) {
            out.push(word);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_scoring() {
        let analyzer = SentimentAnalyzer::default();
        assert_eq!(analyzer.analyze_text(""), 0.0);
        assert!((analyzer.analyze_text("BULLISH breakout") - 0.2).abs() < 1e-12);
        assert!((analyzer.analyze_text("crash and panic") + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_substring_matches_count() {
        let analyzer = SentimentAnalyzer::default();
        // "update" contains "up"
        assert!((analyzer.analyze_text("update") - 0.1).abs() < 1e-12);
        // "upup" has two non-overlapping "up"
        assert!((analyzer.analyze_text("upup") - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_text_score_clamped() {
        let analyzer = SentimentAnalyzer::default();
        let text = "moon ".repeat(25);
        assert_eq!(analyzer.analyze_text(&text), 1.0);
        let text = "dump ".repeat(25);
        assert_eq!(analyzer.analyze_text(&text), -1.0);
    }

    #[test]
    fn test_price_action() {
        let analyzer = SentimentAnalyzer::default();
        assert_eq!(analyzer.analyze_price_action(&[]), 0.0);
        assert_eq!(analyzer.analyze_price_action(&[1.0]), 0.0);
        assert_eq!(analyzer.analyze_price_action(&[1.0, 1.0, 1.0]), 0.0);
        assert_eq!(analyzer.analyze_price_action(&[1.0, 2.0, 3.0]), 1.0);
        assert!((analyzer.analyze_price_action(&[1.0, 2.0, 1.5, 3.0]) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_counts_samples() {
        let analyzer = SentimentAnalyzer::default();
        let sources = vec![
            SentimentSource::text("pump pump"),
            SentimentSource::prices(vec![3.0, 2.0]),
            SentimentSource {
                text: Some(String::new()),
                prices: Some(Vec::new()),
            },
        ];

        let reading = analyzer.aggregate_sentiment(&sources);
        // samples: 0.2, -1.0, 0.0
        assert!((reading.overall - (-0.8 / 3.0)).abs() < 1e-12);
        assert!((reading.confidence - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_empty() {
        let reading = SentimentAnalyzer::default().aggregate_sentiment(&[]);
        assert_eq!(reading, SentimentReading::default());
    }

    #[test]
    fn test_confidence_saturates() {
        let analyzer = SentimentAnalyzer::default();
        let sources = vec![SentimentSource::prices(vec![1.0, 2.0]); 15];
        assert_eq!(analyzer.aggregate_sentiment(&sources).confidence, 1.0);
    }

    #[test]
    fn test_custom_keywords() {
        let analyzer = SentimentAnalyzer::with_keywords(["Hodl"], ["rekt"]).unwrap();
        assert!((analyzer.analyze_text("hodl hodl rekt") - 0.1).abs() < 1e-12);

        assert!(matches!(
            SentimentAnalyzer::with_keywords(["x"], ["X"]),
            Err(AnalysisError::OverlappingKeyword(_))
        ));
        assert!(matches!(
            SentimentAnalyzer::with_keywords([" "], ["y"]),
            Err(AnalysisError::EmptyKeyword("positive"))
        ));
    }
}
