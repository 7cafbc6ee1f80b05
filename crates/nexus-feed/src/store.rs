//! Market state store.
//!
//! Ticks are replaced whole per symbol, never merged. Aggregates are
//! computed on read.

use crate::candles::CandleSeries;
use crate::error::FeedResult;
use dashmap::DashMap;
use nexus_bus::{BusError, Event, EventBus, EventKind, EventPayload, HandlerResult, Subscription};
use nexus_core::{Alert, ArchonMessage, Candle, MarketTick, OrderBook, Pattern, Trade};
use nexus_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace};

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub active_symbol: String,
    pub watchlist: Vec<String>,
    /// Candle bucket width for trade aggregation.
    pub candle_interval_ms: i64,
    /// Candles retained per symbol.
    pub candle_capacity: usize,
    pub pattern_capacity: usize,
    pub message_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            active_symbol: "BTCUSDT".to_string(),
            watchlist: ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            candle_interval_ms: 60_000,
            candle_capacity: 500,
            pattern_capacity: 50,
            message_capacity: 500,
        }
    }
}

struct StoreInner {
    config: StoreConfig,
    markets: DashMap<String, MarketTick>,
    order_books: DashMap<String, OrderBook>,
    candles: DashMap<String, CandleSeries>,
    active_symbol: RwLock<String>,
    watchlist: RwLock<Vec<String>>,
    alerts: RwLock<Vec<Alert>>,
    patterns: RwLock<VecDeque<Pattern>>,
    messages: RwLock<VecDeque<ArchonMessage>>,
    thinking: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Authoritative market snapshot. Cheap to clone.
#[derive(Clone)]
pub struct MarketStore {
    inner: Arc<StoreInner>,
}

impl MarketStore {
    /// Create a detached store.
    pub fn new(config: StoreConfig) -> Self {
        let mut watchlist: Vec<String> = Vec::with_capacity(config.watchlist.len());
        for symbol in &config.watchlist {
            if !watchlist.contains(symbol) {
                watchlist.push(symbol.clone());
            }
        }

        Self {
            inner: Arc::new(StoreInner {
                active_symbol: RwLock::new(config.active_symbol.clone()),
                watchlist: RwLock::new(watchlist),
                markets: DashMap::new(),
                order_books: DashMap::new(),
                candles: DashMap::new(),
                alerts: RwLock::new(Vec::new()),
                patterns: RwLock::new(VecDeque::new()),
                messages: RwLock::new(VecDeque::new()),
                thinking: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    /// Create a store fed by `bus`.
    pub fn attach(bus: &EventBus, config: StoreConfig) -> Self {
        let store = Self::new(config);
        store.subscribe_to(bus);
        store
    }

    fn subscribe_to(&self, bus: &EventBus) {
        let mut subs = self.inner.subscriptions.lock();
        for kind in [
            EventKind::Tick,
            EventKind::Trade,
            EventKind::OrderBook,
            EventKind::Alert,
            EventKind::AlertDismiss,
            EventKind::AiThinking,
        ] {
            let weak = Arc::downgrade(&self.inner);
            subs.push(bus.subscribe(kind, move |event| on_event(&weak, event)));
        }
        info!(subscriptions = subs.len(), "Market store attached to event bus");
    }

    /// Release bus subscriptions. Idempotent.
    pub fn detach(&self) {
        let subs: Vec<Subscription> = self.inner.subscriptions.lock().drain(..).collect();
        if subs.is_empty() {
            return;
        }
        for sub in &subs {
            sub.unsubscribe();
        }
        info!(subscriptions = subs.len(), "Market store detached from event bus");
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // ---- market data ----

    /// Replace the tick for its symbol.
    pub fn set_market_data(&self, tick: MarketTick) -> FeedResult<()> {
        tick.validate()?;
        Metrics::tick_applied(&tick.symbol);
        trace!(symbol = %tick.symbol, price = tick.price, "Tick applied");
        self.inner.markets.insert(tick.symbol.clone(), tick);
        Ok(())
    }

    pub fn tick(&self, symbol: &str) -> Option<MarketTick> {
        self.inner.markets.get(symbol).map(|t| t.value().clone())
    }

    /// Every known tick, keyed by symbol.
    pub fn snapshot(&self) -> HashMap<String, MarketTick> {
        self.inner
            .markets
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Known symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.inner.markets.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn market_count(&self) -> usize {
        self.inner.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.markets.is_empty()
    }

    /// Mean 24h change across known symbols (0 when empty).
    pub fn average_change_24h(&self) -> f64 {
        let (sum, count) = self
            .inner
            .markets
            .iter()
            .fold((0.0, 0usize), |(sum, n), e| (sum + e.value().change_24h, n + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Sum of volume across known symbols (0 when empty).
    pub fn total_volume(&self) -> f64 {
        self.inner.markets.iter().map(|e| e.value().volume).sum()
    }

    pub fn set_order_book(&self, book: OrderBook) {
        self.inner.order_books.insert(book.symbol.clone(), book);
    }

    pub fn order_book(&self, symbol: &str) -> Option<OrderBook> {
        self.inner.order_books.get(symbol).map(|b| b.value().clone())
    }

    // ---- candles ----

    /// Fold a trade into its symbol's candle series.
    ///
    /// Returns `false` if the trade was too late for the series.
    pub fn apply_trade(&self, trade: &Trade) -> bool {
        let applied = self
            .series_entry(&trade.symbol)
            .apply_trade(trade.price, trade.volume, trade.timestamp);
        if !applied {
            debug!(symbol = %trade.symbol, ts = trade.timestamp, "Late trade dropped from candles");
        }
        applied
    }

    /// Append a backfilled candle for `symbol`.
    pub fn push_candle(&self, symbol: &str, candle: Candle) -> FeedResult<()> {
        self.series_entry(symbol).push_candle(candle)
    }

    pub fn candles(&self, symbol: &str) -> Vec<Candle> {
        self.inner
            .candles
            .get(symbol)
            .map(|s| s.to_vec())
            .unwrap_or_default()
    }

    pub fn closes(&self, symbol: &str) -> Vec<f64> {
        self.inner
            .candles
            .get(symbol)
            .map(|s| s.closes())
            .unwrap_or_default()
    }

    fn series_entry(&self, symbol: &str) -> dashmap::mapref::one::RefMut<'_, String, CandleSeries> {
        let config = &self.inner.config;
        self.inner
            .candles
            .entry(symbol.to_string())
            .or_insert_with(|| {
                CandleSeries::new(symbol, config.candle_interval_ms, config.candle_capacity)
            })
    }

    // ---- selection ----

    pub fn active_symbol(&self) -> String {
        self.inner.active_symbol.read().clone()
    }

    pub fn set_active_symbol(&self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        debug!(symbol = %symbol, "Active symbol changed");
        *self.inner.active_symbol.write() = symbol;
    }

    /// Add to the watch list. Returns `false` if already present.
    pub fn add_to_watchlist(&self, symbol: impl Into<String>) -> bool {
        let symbol = symbol.into();
        let mut watchlist = self.inner.watchlist.write();
        if watchlist.contains(&symbol) {
            return false;
        }
        watchlist.push(symbol);
        true
    }

    /// Remove from the watch list. Returns `false` if absent.
    pub fn remove_from_watchlist(&self, symbol: &str) -> bool {
        let mut watchlist = self.inner.watchlist.write();
        let before = watchlist.len();
        watchlist.retain(|s| s != symbol);
        watchlist.len() != before
    }

    pub fn watchlist(&self) -> Vec<String> {
        self.inner.watchlist.read().clone()
    }

    // ---- alerts / patterns / conversation ----

    pub fn add_alert(&self, alert: Alert) {
        self.inner.alerts.write().push(alert);
    }

    /// Remove an alert by id. Returns `false` if unknown.
    pub fn dismiss_alert(&self, id: &str) -> bool {
        let mut alerts = self.inner.alerts.write();
        let before = alerts.len();
        alerts.retain(|a| a.id != id);
        alerts.len() != before
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.inner.alerts.read().clone()
    }

    pub fn record_pattern(&self, pattern: Pattern) {
        push_bounded(
            &mut self.inner.patterns.write(),
            pattern,
            self.inner.config.pattern_capacity,
        );
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.inner.patterns.read().iter().cloned().collect()
    }

    pub fn add_message(&self, message: ArchonMessage) {
        push_bounded(
            &mut self.inner.messages.write(),
            message,
            self.inner.config.message_capacity,
        );
    }

    pub fn messages(&self) -> Vec<ArchonMessage> {
        self.inner.messages.read().iter().cloned().collect()
    }

    pub fn set_thinking(&self, thinking: bool) {
        self.inner.thinking.store(thinking, Ordering::SeqCst);
    }

    pub fn is_thinking(&self) -> bool {
        self.inner.thinking.load(Ordering::SeqCst)
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while buf.len() >= capacity {
        buf.pop_front();
    }
    buf.push_back(item);
}

fn on_event(store: &Weak<StoreInner>, event: &Event) -> HandlerResult {
    let Some(inner) = store.upgrade() else {
        return Ok(());
    };
    let store = MarketStore { inner };

    match (&event.kind, &event.payload) {
        (EventKind::Tick, EventPayload::Tick(tick)) => {
            store
                .set_market_data(tick.clone())
                .map_err(|e| BusError::Rejected {
                    kind: EventKind::Tick,
                    reason: e.to_string(),
                })?
        }
        (EventKind::Trade, EventPayload::Trade(trade)) => {
            store.apply_trade(trade);
        }
        (EventKind::OrderBook, EventPayload::OrderBook(book)) => store.set_order_book(book.clone()),
        (EventKind::Alert, EventPayload::Alert(alert)) => store.add_alert(alert.clone()),
        (EventKind::AlertDismiss, EventPayload::AlertDismissed { id }) => {
            store.dismiss_alert(id);
        }
        (EventKind::AiThinking, EventPayload::Thinking(thinking)) => store.set_thinking(*thinking),
        (kind, _) => {
            return Err(Box::new(BusError::UnexpectedPayload {
                kind: *kind,
                expected: expected_payload(*kind),
            }))
        }
    }
    Ok(())
}

fn expected_payload(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Tick => "tick",
        EventKind::Trade => "trade",
        EventKind::OrderBook => "orderBook",
        EventKind::Alert => "alert",
        EventKind::AlertDismiss => "alertDismissed",
        EventKind::AiThinking => "thinking",
        _ => "none",
    }
}

impl std::fmt::Debug for MarketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStore")
            .field("markets", &self.inner.markets.len())
            .field("active_symbol", &*self.inner.active_symbol.read())
            .finish()
    }
}
