//! Per-symbol candle history.
//!
//! Trades are folded into fixed-width buckets aligned to the epoch. The
//! series is ascending with no duplicate timestamps and holds at most
//! `capacity` candles; the oldest are evicted first.

use crate::error::{FeedError, FeedResult};
use nexus_core::Candle;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct CandleSeries {
    symbol: String,
    interval_ms: i64,
    capacity: usize,
    candles: VecDeque<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, interval_ms: i64, capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            interval_ms: interval_ms.max(1),
            capacity,
            candles: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Floor a timestamp to its bucket boundary.
    pub fn align(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms.div_euclid(self.interval_ms) * self.interval_ms
    }

    /// Fold a trade into the series.
    ///
    /// Returns `false` when the trade belongs to a bucket older than the
    /// newest one and was dropped.
    pub fn apply_trade(&mut self, price: f64, volume: f64, timestamp_ms: i64) -> bool {
        let bucket = self.align(timestamp_ms);

        match self.candles.back_mut() {
            Some(last) if bucket == last.timestamp => {
                last.update(price, volume);
                true
            }
            Some(last) if bucket < last.timestamp => false,
            _ => {
                self.push_back(Candle::from_trade(bucket, price, volume));
                true
            }
        }
    }

    /// Append a complete candle (history backfill).
    pub fn push_candle(&mut self, candle: Candle) -> FeedResult<()> {
        candle.validate()?;
        if let Some(last) = self.candles.back() {
            if candle.timestamp <= last.timestamp {
                return Err(FeedError::StaleCandle {
                    symbol: self.symbol.clone(),
                    timestamp: candle.timestamp,
                    last: last.timestamp,
                });
            }
        }
        self.push_back(candle);
        Ok(())
    }

    fn push_back(&mut self, candle: Candle) {
        if self.capacity == 0 {
            return;
        }
        while self.candles.len() >= self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Candles in ascending time order.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trades_fold_into_buckets() {
        let mut series = CandleSeries::new("BTCUSDT", 60_000, 10);

        assert!(series.apply_trade(100.0, 1.0, 60_000));
        assert!(series.apply_trade(105.0, 2.0, 90_000));
        assert!(series.apply_trade(98.0, 1.0, 119_999));
        assert!(series.apply_trade(101.0, 1.0, 120_000));

        let candles = series.to_vec();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 60_000);
        assert_eq!(candles[0].open, 100.0);
        assert_eq!(candles[0].high, 105.0);
        assert_eq!(candles[0].low, 98.0);
        assert_eq!(candles[0].close, 98.0);
        assert_eq!(candles[0].volume, 4.0);
        assert_eq!(candles[1].timestamp, 120_000);
    }

    #[test]
    fn test_late_trade_dropped() {
        let mut series = CandleSeries::new("BTCUSDT", 1_000, 10);
        series.apply_trade(100.0, 1.0, 5_000);

        assert!(!series.apply_trade(50.0, 1.0, 3_999));
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().low, 100.0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut series = CandleSeries::new("ETHUSDT", 1_000, 3);
        for i in 0..5 {
            series.apply_trade(10.0 + i as f64, 1.0, i * 1_000);
        }

        let ts: Vec<i64> = series.to_vec().iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![2_000, 3_000, 4_000]);
        assert_eq!(series.closes(), vec![12.0, 13.0, 14.0]);
    }

    #[test]
    fn test_push_candle_rejects_out_of_order() {
        let mut series = CandleSeries::new("SOLUSDT", 1_000, 10);
        let candle = Candle {
            timestamp: 2_000,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 3.0,
        };
        series.push_candle(candle).unwrap();

        let stale = Candle {
            timestamp: 2_000,
            ..candle
        };
        assert!(matches!(
            series.push_candle(stale),
            Err(FeedError::StaleCandle { .. })
        ));

        let broken = Candle {
            timestamp: 3_000,
            high: 0.1,
            ..candle
        };
        assert!(matches!(
            series.push_candle(broken),
            Err(FeedError::InvalidData(_))
        ));
    }

    #[test]
    fn test_negative_timestamp_alignment() {
        let series = CandleSeries::new("X", 1_000, 1);
        assert_eq!(series.align(-1), -1_000);
        assert_eq!(series.align(1_999), 1_000);
    }
}
