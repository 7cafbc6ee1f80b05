//! Synthetic market data for running without network feeds.
//!
//! Prices oscillate deterministically around a per-symbol base so repeated
//! runs produce the same series.

use chrono::Utc;
use nexus_bus::{EventBus, EventKind, EventPayload};
use nexus_core::{MarketTick, Side, Trade};
use tracing::trace;

/// Source tag on events published by the demo generator.
pub const DEMO_SOURCE: &str = "demo";

/// Peak absolute 24h change in percent.
const MAX_CHANGE_PCT: f64 = 5.0;
const BASE_VOLUME: f64 = 500_000.0;
const BASE_LIQUIDITY: f64 = 5_000_000.0;
/// Phase advance per step.
const PHASE_STEP: f64 = 0.3;

pub fn base_price(symbol: &str) -> f64 {
    match symbol {
        "BTCUSDT" => 45_000.0,
        "ETHUSDT" => 2_500.0,
        "SOLUSDT" => 100.0,
        _ => 300.0,
    }
}

#[derive(Debug, Default)]
pub struct DemoFeed {
    step: u64,
}

impl DemoFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// One tick and one trade per symbol, then advance.
    pub fn next_batch(&mut self, symbols: &[String], now_ms: i64) -> Vec<(MarketTick, Trade)> {
        let batch = symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let phase = self.step as f64 * PHASE_STEP + i as f64;
                let change = MAX_CHANGE_PCT * phase.sin();
                let price = base_price(symbol) * (1.0 + change / 100.0);
                let volume = BASE_VOLUME * (1.0 + 0.5 * phase.cos());

                let tick = MarketTick {
                    symbol: symbol.clone(),
                    price,
                    volume,
                    timestamp: now_ms,
                    change_24h: change,
                    high_24h: price * 1.05,
                    low_24h: price * 0.95,
                    sentiment: (change / 10.0).clamp(-1.0, 1.0),
                    liquidity: BASE_LIQUIDITY * (1.0 + 0.5 * (phase * 0.5).sin()),
                };
                let trade = Trade {
                    id: format!("demo-{}-{}", self.step, i),
                    symbol: symbol.clone(),
                    price,
                    volume: 1.0 + phase.cos().abs(),
                    side: if change >= 0.0 { Side::Buy } else { Side::Sell },
                    timestamp: now_ms,
                };
                (tick, trade)
            })
            .collect();

        self.step += 1;
        batch
    }

    /// Publish the next batch on `bus`. Returns the number of symbols.
    pub fn publish(&mut self, bus: &EventBus, symbols: &[String]) -> usize {
        let batch = self.next_batch(symbols, Utc::now().timestamp_millis());
        let n = batch.len();
        for (tick, trade) in batch {
            bus.publish(EventKind::Tick, EventPayload::Tick(tick), DEMO_SOURCE);
            bus.publish(EventKind::Trade, EventPayload::Trade(trade), DEMO_SOURCE);
        }
        trace!(step = self.step, symbols = n, "Demo batch published");
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_feed::{MarketStore, StoreConfig};

    fn symbols() -> Vec<String> {
        vec!["BTCUSDT".to_string(), "DOGEUSDT".to_string()]
    }

    #[test]
    fn test_batch_is_deterministic() {
        let a = DemoFeed::new().next_batch(&symbols(), 1_000);
        let b = DemoFeed::new().next_batch(&symbols(), 1_000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ticks_are_valid_and_bounded() {
        let mut demo = DemoFeed::new();
        for _ in 0..50 {
            for (tick, trade) in demo.next_batch(&symbols(), 1_000) {
                tick.validate().unwrap();
                assert!(tick.change_24h.abs() <= MAX_CHANGE_PCT);
                assert!(tick.sentiment.abs() <= 1.0);
                assert_eq!(trade.price, tick.price);
            }
        }
        assert_eq!(demo.step(), 50);
    }

    #[test]
    fn test_base_prices() {
        let batch = DemoFeed::new().next_batch(&symbols(), 0);
        // step 0: BTC at phase 0, unchanged
        assert_eq!(batch[0].0.price, 45_000.0);
        let doge = &batch[1].0;
        assert!(doge.price > 300.0 * 0.95 && doge.price < 300.0 * 1.05);
    }

    #[test]
    fn test_publish_feeds_store() {
        let bus = EventBus::new(100);
        let store = MarketStore::attach(&bus, StoreConfig::default());
        let mut demo = DemoFeed::new();

        assert_eq!(demo.publish(&bus, &symbols()), 2);
        assert_eq!(store.market_count(), 2);
        assert_eq!(store.candles("BTCUSDT").len(), 1);
        assert_eq!(bus.history(Some(EventKind::Tick), 10)[0].source, DEMO_SOURCE);
    }
}
