//! Archon: answers market questions from the store snapshot.
//!
//! Context is rebuilt from the store on every call and never cached.

use crate::error::{ArchonError, ArchonResult};
use crate::intent::Intent;
use nexus_analysis::{detect_all, SentimentAnalyzer};
use nexus_core::{
    ArchonMessage, Direction, MarketContext, MarketMood, MarketTick, MessageRole, Pattern,
    PatternBias, Prediction, Trend,
};
use nexus_feed::MarketStore;
use std::fmt;
use tracing::{debug, info};

/// Reply used while the store has no market data.
pub const STILL_ANALYZING: &str = "I'm analyzing the market data. Please wait a moment...";

/// Confidence attached to every context.
pub const CONTEXT_CONFIDENCE: f64 = 0.85;

/// Bullish/bearish count ratio that sets a trend.
const TREND_RATIO: f64 = 1.5;
const HIGH_VOLATILITY: f64 = 5.0;
const MODERATE_VOLATILITY: f64 = 3.0;
/// Sentiment beyond which a trend is expected to continue.
const CONVICTION_SENTIMENT: f64 = 0.3;

/// Quote assets recognized when resolving a bare base asset.
const QUOTE_ASSETS: &[&str] = &["USDT", "USDC", "BUSD", "USD", "BTC", "ETH"];
/// Suffixes that make an unknown token look like a trading pair.
const PAIR_SUFFIXES: &[&str] = &["USDT", "USD", "BTC"];
const MIN_PAIR_LEN: usize = 6;

const PREDICTION_RISKS: &[&str] = &[
    "Market volatility may exceed expectations",
    "External events could impact prediction",
    "Always use proper risk management",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    fn from_volatility(volatility: f64) -> Self {
        if volatility > HIGH_VOLATILITY {
            Self::High
        } else if volatility > MODERATE_VOLATILITY {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    fn advice(&self) -> &'static str {
        match self {
            Self::High => "Reduce position sizes and use tight stop losses.",
            Self::Moderate => "Standard risk management applies. Monitor closely.",
            Self::Low => "Favorable conditions for position building.",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Template-based market analyst.
#[derive(Debug, Clone)]
pub struct Archon {
    store: MarketStore,
    sentiment: SentimentAnalyzer,
}

impl Archon {
    pub fn new(store: MarketStore) -> Self {
        Self {
            store,
            sentiment: SentimentAnalyzer::default(),
        }
    }

    pub fn store(&self) -> &MarketStore {
        &self.store
    }

    /// Derive the current market context. `None` when the store is empty.
    pub fn build_context(&self) -> Option<MarketContext> {
        let mut markets: Vec<MarketTick> = self.store.snapshot().into_values().collect();
        if markets.is_empty() {
            return None;
        }
        markets.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let n = markets.len() as f64;
        let avg_change = markets.iter().map(|m| m.change_24h).sum::<f64>() / n;
        let sentiment = (avg_change / 10.0).clamp(-1.0, 1.0);

        let bullish = markets.iter().filter(|m| m.change_24h > 0.0).count() as f64;
        let bearish = n - bullish;
        let trend = if bullish > bearish * TREND_RATIO {
            Trend::Bullish
        } else if bearish > bullish * TREND_RATIO {
            Trend::Bearish
        } else {
            Trend::Neutral
        };

        let volatility = markets.iter().map(MarketTick::range_pct).sum::<f64>() / n;

        Some(MarketContext {
            market_state: MarketMood {
                trend,
                volatility,
                sentiment,
            },
            user_intent: String::new(),
            relevant_data: markets,
            confidence: CONTEXT_CONFIDENCE,
        })
    }

    /// Answer one user message.
    ///
    /// Fails only when the message names a pair that has no data.
    pub async fn process_message(&self, text: &str) -> ArchonResult<ArchonMessage> {
        let intent = Intent::classify(text);
        let context = self.build_context().map(|mut ctx| {
            ctx.user_intent = intent.as_str().to_string();
            ctx
        });

        // Inference is logically asynchronous; let other tasks run first.
        tokio::task::yield_now().await;

        let content = match &context {
            None => STILL_ANALYZING.to_string(),
            Some(ctx) => self.respond(text, intent, ctx)?,
        };

        debug!(intent = %intent, has_context = context.is_some(), "Archon replied");
        Ok(ArchonMessage::new(MessageRole::Archon, content).with_context(context))
    }

    fn respond(&self, text: &str, intent: Intent, ctx: &MarketContext) -> ArchonResult<String> {
        let mood = &ctx.market_state;

        let reply = match intent {
            Intent::TrendAnalysis => format!(
                "Current market trend is **{}** with {:.1}% volatility. Sentiment index: {:.0}%. {}",
                mood.trend.to_string().to_uppercase(),
                mood.volatility,
                mood.sentiment * 100.0,
                trend_insight(mood.trend)
            ),
            Intent::RiskAssessment => {
                let level = RiskLevel::from_volatility(mood.volatility);
                format!(
                    "Risk Level: **{level}**. Volatility at {:.1}%. {}",
                    mood.volatility,
                    level.advice()
                )
            }
            Intent::Prediction => {
                let mut reply = format!(
                    "Based on current {} trend and {:.1}% volatility, I predict {}. Confidence: {:.0}%.",
                    mood.trend,
                    mood.volatility,
                    outlook(mood),
                    ctx.confidence * 100.0
                );
                for symbol in self.mentioned_symbols(text, ctx)? {
                    let p = self.predict_from(ctx, &symbol)?;
                    reply.push_str(&format!(
                        " {}: {} toward ${:.2} within {}.",
                        p.symbol, p.direction, p.target_price, p.timeframe
                    ));
                }
                reply
            }
            Intent::PatternRecognition => format!(
                "Analyzing patterns... Detected {} momentum with {} sentiment. {}",
                mood.trend,
                polarity(mood.sentiment),
                self.pattern_insight(mood)
            ),
            Intent::PriceQuery => self.price_reply(text, ctx)?,
            Intent::TradeIntent => {
                let level = RiskLevel::from_volatility(mood.volatility);
                format!(
                    "Market is {} with {:.1}% volatility (risk {level}). {} {}",
                    mood.trend,
                    mood.volatility,
                    trend_insight(mood.trend),
                    level.advice()
                )
            }
            Intent::GeneralQuery => format!(
                "Market is {} with {:.1}% volatility. How can I assist your trading strategy?",
                mood.trend, mood.volatility
            ),
        };
        Ok(reply)
    }

    fn price_reply(&self, text: &str, ctx: &MarketContext) -> ArchonResult<String> {
        let mut symbols = self.mentioned_symbols(text, ctx)?;
        if symbols.is_empty() {
            symbols.push(self.store.active_symbol());
        }

        let quotes: Vec<String> = symbols
            .iter()
            .map(|symbol| match find_tick(ctx, symbol) {
                Some(t) => format!(
                    "{} is trading at ${:.2} ({:+.2}% 24h).",
                    t.symbol, t.price, t.change_24h
                ),
                None => format!("No live quote for {symbol} yet."),
            })
            .collect();

        Ok(format!(
            "{} Market is {} overall.",
            quotes.join(" "),
            ctx.market_state.trend
        ))
    }

    /// Candlestick and trend patterns on the active symbol's candles.
    ///
    /// Read-only; callers decide whether to keep the results.
    pub fn candle_patterns(&self) -> Vec<Pattern> {
        detect_all(&self.store.candles(&self.store.active_symbol()))
    }

    /// Candle patterns on the active symbol, else a trend-derived remark.
    fn pattern_insight(&self, mood: &MarketMood) -> String {
        let symbol = self.store.active_symbol();
        let candles = self.store.candles(&symbol);
        let patterns = detect_all(&candles);

        let mut insight = if patterns.is_empty() {
            fallback_pattern_insight(mood).to_string()
        } else {
            let found: Vec<String> = patterns
                .iter()
                .map(|p| format!("{} ({}, {:.0}%)", p.name, p.timeframe, p.confidence * 100.0))
                .collect();
            format!("{symbol}: {}.", found.join(", "))
        };

        if candles.len() >= 2 {
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            let momentum = self.sentiment.analyze_price_action(&closes);
            insight.push_str(&format!(" Price action score {momentum:+.2}."));
        }

        insight
    }

    /// Symbols named in `text`, resolved against the context.
    ///
    /// Fails when a token looks like a pair but has no data.
    fn mentioned_symbols(&self, text: &str, ctx: &MarketContext) -> ArchonResult<Vec<String>> {
        let mut found: Vec<String> = Vec::new();

        for token in text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| t.len() >= 2)
            .map(str::to_ascii_uppercase)
        {
            let resolved = if find_tick(ctx, &token).is_some() {
                Some(token.clone())
            } else {
                QUOTE_ASSETS
                    .iter()
                    .map(|quote| format!("{token}{quote}"))
                    .find(|pair| find_tick(ctx, pair).is_some())
            };

            match resolved {
                Some(symbol) => {
                    if !found.contains(&symbol) {
                        found.push(symbol);
                    }
                }
                None if looks_like_pair(&token) => {
                    return Err(ArchonError::SymbolNotFound(token));
                }
                None => {}
            }
        }
        Ok(found)
    }

    /// Market-level patterns from the current context.
    pub fn detect_patterns(&self) -> Vec<Pattern> {
        let Some(ctx) = self.build_context() else {
            return Vec::new();
        };
        let mood = ctx.market_state;
        let mut patterns = Vec::new();

        if mood.trend != Trend::Neutral {
            let (name, bias_word) = match mood.trend {
                Trend::Bullish => ("Bullish Trend", "Long"),
                _ => ("Bearish Trend", "Short"),
            };
            let bias_line = format!("{bias_word} bias recommended");
            patterns.push(Pattern::new(
                "trend",
                name,
                PatternBias::from(mood.trend),
                0.75,
                "4H",
                &format!("Strong {} momentum detected", mood.trend),
                &[
                    bias_line.as_str(),
                    "Monitor for trend continuation or reversal signals",
                ],
            ));
        }

        if mood.volatility > HIGH_VOLATILITY {
            patterns.push(Pattern::new(
                "volatility",
                "High Volatility",
                PatternBias::Neutral,
                0.85,
                "1H",
                "Elevated volatility detected",
                &["Wider stop losses recommended", "Potential for large price swings"],
            ));
        }

        patterns
    }

    /// 24h prediction for `symbol`.
    pub fn generate_prediction(&self, symbol: &str) -> ArchonResult<Prediction> {
        let ctx = self.build_context().ok_or(ArchonError::NoContext)?;
        let prediction = self.predict_from(&ctx, symbol)?;
        info!(
            symbol = %prediction.symbol,
            direction = %prediction.direction,
            target = prediction.target_price,
            "Prediction generated"
        );
        Ok(prediction)
    }

    fn predict_from(&self, ctx: &MarketContext, symbol: &str) -> ArchonResult<Prediction> {
        let market =
            find_tick(ctx, symbol).ok_or_else(|| ArchonError::SymbolNotFound(symbol.to_string()))?;
        let mood = &ctx.market_state;

        let sign = if mood.sentiment > 0.0 { 1.0 } else { -1.0 };
        let target_price = market.price * (1.0 + mood.volatility * sign / 100.0);

        Ok(Prediction {
            symbol: symbol.to_string(),
            timeframe: "24H".to_string(),
            direction: Direction::from(mood.trend),
            target_price,
            confidence: ctx.confidence,
            reasoning: format!(
                "Based on {} trend and {} sentiment",
                mood.trend,
                polarity(mood.sentiment)
            ),
            risks: PREDICTION_RISKS.iter().map(|r| r.to_string()).collect(),
        })
    }
}

fn find_tick<'a>(ctx: &'a MarketContext, symbol: &str) -> Option<&'a MarketTick> {
    ctx.relevant_data.iter().find(|m| m.symbol == symbol)
}

fn looks_like_pair(token: &str) -> bool {
    token.len() >= MIN_PAIR_LEN && PAIR_SUFFIXES.iter().any(|q| token.ends_with(q))
}

fn polarity(sentiment: f64) -> &'static str {
    if sentiment > 0.0 {
        "positive"
    } else {
        "negative"
    }
}

fn trend_insight(trend: Trend) -> &'static str {
    match trend {
        Trend::Bullish => {
            "Strong buying pressure detected. Consider long positions with proper risk management."
        }
        Trend::Bearish => "Selling pressure dominant. Exercise caution with long positions.",
        Trend::Neutral => "Market consolidating. Wait for clear directional move.",
    }
}

fn outlook(mood: &MarketMood) -> &'static str {
    match mood.trend {
        Trend::Bullish if mood.sentiment > CONVICTION_SENTIMENT => {
            "continued upward movement in the short term"
        }
        Trend::Bearish if mood.sentiment < -CONVICTION_SENTIMENT => {
            "further downside pressure likely"
        }
        _ => "sideways consolidation before next major move",
    }
}

fn fallback_pattern_insight(mood: &MarketMood) -> &'static str {
    match mood.trend {
        Trend::Bullish => "Higher highs and higher lows forming.",
        Trend::Bearish => "Support/resistance levels holding strong.",
        Trend::Neutral if mood.volatility > MODERATE_VOLATILITY => {
            "Potential breakout setup developing."
        }
        Trend::Neutral => "Consolidation pattern emerging.",
    }
}
