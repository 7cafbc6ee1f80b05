//! Candlestick and trend pattern recognition.
//!
//! Every detector runs independently; a single input may yield several
//! patterns at once. Input candles are in chronological order.

use nexus_core::{Candle, Pattern, PatternBias};
use tracing::trace;

/// Minimum candles for candlestick patterns.
pub const MIN_CANDLES_CANDLESTICK: usize = 3;
/// Minimum candles (and lookback window) for trend patterns.
pub const MIN_CANDLES_TREND: usize = 10;

/// Body/range ratio under which a candle is a doji.
const DOJI_MAX_BODY_RATIO: f64 = 0.1;
/// Dominant wick must exceed this multiple of the body.
const WICK_BODY_MULTIPLE: f64 = 2.0;

const CANDLESTICK_TIMEFRAME: &str = "1H";
const TREND_TIMEFRAME: &str = "4H";

/// Patterns formed by the last candle (and the one before it).
///
/// Returns nothing for fewer than three candles.
pub fn detect_candle_patterns(candles: &[Candle]) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    if candles.len() < MIN_CANDLES_CANDLESTICK {
        return patterns;
    }

    let last = &candles[candles.len() - 1];
    let body = last.body();
    let range = last.range();
    let lower_wick = last.lower_wick();
    let upper_wick = last.upper_wick();

    // A flat candle has no meaningful ratio.
    if range > 0.0 && body / range < DOJI_MAX_BODY_RATIO {
        patterns.push(Pattern::new(
            "doji",
            "Doji",
            PatternBias::Neutral,
            0.8,
            CANDLESTICK_TIMEFRAME,
            "Indecision in the market",
            &["Potential reversal signal", "Wait for confirmation"],
        ));
    }

    if lower_wick > body * WICK_BODY_MULTIPLE && upper_wick < body {
        patterns.push(Pattern::new(
            "hammer",
            "Hammer",
            PatternBias::Bullish,
            0.75,
            CANDLESTICK_TIMEFRAME,
            "Bullish reversal pattern",
            &["Potential bottom", "Look for bullish confirmation"],
        ));
    }

    if upper_wick > body * WICK_BODY_MULTIPLE && lower_wick < body {
        patterns.push(Pattern::new(
            "shooting-star",
            "Shooting Star",
            PatternBias::Bearish,
            0.75,
            CANDLESTICK_TIMEFRAME,
            "Bearish reversal pattern",
            &["Potential top", "Look for bearish confirmation"],
        ));
    }

    let prev = &candles[candles.len() - 2];
    let (prev_bullish, curr_bullish) = (prev.is_bullish(), last.is_bullish());

    if !prev_bullish && curr_bullish && last.open < prev.close && last.close > prev.open {
        patterns.push(Pattern::new(
            "bullish-engulfing",
            "Bullish Engulfing",
            PatternBias::Bullish,
            0.85,
            CANDLESTICK_TIMEFRAME,
            "Strong bullish reversal",
            &["High probability reversal", "Consider long positions"],
        ));
    }

    if prev_bullish && !curr_bullish && last.open > prev.close && last.close < prev.open {
        patterns.push(Pattern::new(
            "bearish-engulfing",
            "Bearish Engulfing",
            PatternBias::Bearish,
            0.85,
            CANDLESTICK_TIMEFRAME,
            "Strong bearish reversal",
            &["High probability reversal", "Consider short positions"],
        ));
    }

    trace!(candles = candles.len(), found = patterns.len(), "Candlestick scan");
    patterns
}

/// Uptrend/downtrend over the last ten candles.
///
/// Requires strictly monotone highs and lows across every consecutive pair.
pub fn detect_trend_patterns(candles: &[Candle]) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    if candles.len() < MIN_CANDLES_TREND {
        return patterns;
    }

    let window = &candles[candles.len() - MIN_CANDLES_TREND..];
    let uptrend = window
        .windows(2)
        .all(|w| w[1].high > w[0].high && w[1].low > w[0].low);
    let downtrend = window
        .windows(2)
        .all(|w| w[1].high < w[0].high && w[1].low < w[0].low);

    if uptrend {
        patterns.push(Pattern::new(
            "uptrend",
            "Uptrend",
            PatternBias::Bullish,
            0.8,
            TREND_TIMEFRAME,
            "Clear upward trend",
            &["Trend is your friend", "Look for pullback entries"],
        ));
    }

    if downtrend {
        patterns.push(Pattern::new(
            "downtrend",
            "Downtrend",
            PatternBias::Bearish,
            0.8,
            TREND_TIMEFRAME,
            "Clear downward trend",
            &["Avoid catching falling knives", "Wait for reversal confirmation"],
        ));
    }

    patterns
}

/// Candlestick patterns followed by trend patterns.
pub fn detect_all(candles: &[Candle]) -> Vec<Pattern> {
    let mut patterns = detect_candle_patterns(candles);
    patterns.extend(detect_trend_patterns(candles));
    patterns
}
