//! Main application context.

use crate::config::AppConfig;
use crate::demo::DemoFeed;
use crate::error::AppResult;
use nexus_archon::Archon;
use nexus_bus::{EventBus, EventKind, EventPayload};
use nexus_core::{Alert, AlertKind, AlertSeverity, ArchonMessage, MessageRole};
use nexus_feed::MarketStore;
use nexus_telemetry::Metrics;
use nexus_ws::FeedManager;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reply sent when Archon fails to answer.
pub const ERROR_REPLY: &str = "I encountered an error processing your request. Please try again.";

/// Source tag on events published by the application itself.
pub const APP_SOURCE: &str = "app";

/// Context volatility (%) above which a risk alert is raised.
const ALERT_VOLATILITY: f64 = 5.0;

/// Main application.
pub struct Application {
    config: AppConfig,
    bus: EventBus,
    store: MarketStore,
    feeds: FeedManager,
    archon: Archon,
    cancel: CancellationToken,
}

impl Application {
    /// Build the pipeline: bus, store, feed manager, archon.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let bus = EventBus::new(config.bus.history_capacity);
        let store = MarketStore::attach(&bus, config.store.clone());
        let feeds = FeedManager::new(bus.clone());
        let archon = Archon::new(store.clone());

        info!(
            feeds = config.feeds.len(),
            watchlist = ?store.watchlist(),
            demo = config.demo.enabled,
            "Application initialized"
        );

        Ok(Self {
            config,
            bus,
            store,
            feeds,
            archon,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &MarketStore {
        &self.store
    }

    pub fn feeds(&self) -> &FeedManager {
        &self.feeds
    }

    pub fn archon(&self) -> &Archon {
        &self.archon
    }

    /// Token that stops `run` when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open every configured feed. Returns how many were started.
    pub fn start_feeds(&self) -> usize {
        self.config
            .feeds
            .iter()
            .filter(|feed| self.feeds.connect(feed.id.clone(), feed.to_feed_config()))
            .count()
    }

    /// Answer one user query through Archon.
    ///
    /// Both sides of the exchange go to the conversation log and the bus.
    /// Errors are logged and answered with [`ERROR_REPLY`].
    pub async fn answer(&self, query: &str) -> ArchonMessage {
        self.bus
            .publish(EventKind::AiThinking, EventPayload::Thinking(true), APP_SOURCE);

        let user = ArchonMessage::new(MessageRole::User, query);
        self.store.add_message(user.clone());
        self.bus
            .publish(EventKind::AiMessage, EventPayload::Message(user), APP_SOURCE);

        let reply = match self.archon.process_message(query).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Archon failed to answer");
                ArchonMessage::new(MessageRole::Archon, ERROR_REPLY)
            }
        };

        self.store.add_message(reply.clone());
        self.bus.publish(
            EventKind::AiMessage,
            EventPayload::Message(reply.clone()),
            APP_SOURCE,
        );
        self.bus
            .publish(EventKind::AiThinking, EventPayload::Thinking(false), APP_SOURCE);

        reply
    }

    /// Log one status line. Raises a risk alert when volatility crosses
    /// above the alert level.
    ///
    /// Returns whether the market is currently volatile.
    pub fn report_status(&self, was_volatile: bool) -> bool {
        let open_feeds = self
            .feeds
            .connection_ids()
            .iter()
            .filter(|id| self.feeds.is_open(id))
            .count();

        let Some(ctx) = self.archon.build_context() else {
            info!(open_feeds, "Market status: no data yet");
            return false;
        };

        let mood = &ctx.market_state;
        info!(
            markets = self.store.market_count(),
            avg_change_24h = self.store.average_change_24h(),
            total_volume = self.store.total_volume(),
            trend = %mood.trend,
            volatility = mood.volatility,
            open_feeds,
            "Market status"
        );

        let volatile = mood.volatility > ALERT_VOLATILITY;
        if volatile && !was_volatile {
            let alert = Alert::new(
                AlertKind::Risk,
                AlertSeverity::High,
                "High volatility",
                format!(
                    "Average 24h range is {:.2}% of price across {} markets.",
                    mood.volatility,
                    ctx.relevant_data.len()
                ),
            );
            warn!(volatility = mood.volatility, "Volatility alert raised");
            self.bus
                .publish(EventKind::Alert, EventPayload::Alert(alert), APP_SOURCE);
        }

        self.record_new_patterns();
        volatile
    }

    /// Keep candle patterns not yet in the store's pattern log.
    ///
    /// Returns how many were recorded.
    pub fn record_new_patterns(&self) -> usize {
        let known = self.store.patterns();
        let mut recorded = 0;
        for pattern in self.archon.candle_patterns() {
            let seen = known
                .iter()
                .any(|p| p.name == pattern.name && p.timeframe == pattern.timeframe);
            if seen {
                continue;
            }
            info!(
                pattern = %pattern.name,
                confidence = pattern.confidence,
                timeframe = %pattern.timeframe,
                "Pattern detected"
            );
            self.store.record_pattern(pattern);
            recorded += 1;
        }
        recorded
    }

    /// Run until Ctrl-C, stdin EOF or cancellation, then shut down.
    pub async fn run(self) -> AppResult<()> {
        let started = self.start_feeds();
        info!(started, "Feeds started");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        let mut status_interval =
            tokio::time::interval(Duration::from_secs(self.config.status_interval_secs));
        let mut demo_interval =
            tokio::time::interval(Duration::from_millis(self.config.demo.interval_ms.max(1)));
        let mut demo = DemoFeed::new();
        let demo_enabled = self.config.demo.enabled;
        let mut volatile = false;

        info!("Entering main event loop");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            let query = line.trim();
                            if query.is_empty() {
                                continue;
                            }
                            if matches!(query, "quit" | "exit") {
                                info!("Quit requested");
                                break;
                            }
                            let reply = self.answer(query).await;
                            let out = format!("archon> {}\n", reply.content);
                            if let Err(e) = stdout.write_all(out.as_bytes()).await {
                                warn!(error = %e, "Failed to write reply");
                            }
                            let _ = stdout.flush().await;
                        }
                        Ok(None) => {
                            info!("Input closed");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read input");
                            break;
                        }
                    }
                }

                _ = status_interval.tick() => {
                    volatile = self.report_status(volatile);
                }

                _ = demo_interval.tick(), if demo_enabled => {
                    let symbols = self.store.watchlist();
                    demo.publish(&self.bus, &symbols);
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = self.cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Disconnect feeds, detach the store and clear the bus.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.feeds.shutdown().await;
        debug!("Feeds disconnected");
        self.store.detach();
        self.bus.clear();
        match Metrics::gather_text() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => warn!(error = %e, "Failed to render metrics"),
        }
        info!(messages = self.store.messages().len(), "Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedEntry;
    use nexus_archon::STILL_ANALYZING;
    use nexus_core::{Candle, MarketTick};

    fn tick(symbol: &str, price: f64, change: f64, high: f64, low: f64) -> MarketTick {
        MarketTick {
            symbol: symbol.to_string(),
            price,
            volume: 1_000.0,
            timestamp: 1,
            change_24h: change,
            high_24h: high,
            low_24h: low,
            sentiment: 0.0,
            liquidity: 0.0,
        }
    }

    #[tokio::test]
    async fn test_answer_without_data() {
        let app = Application::new(AppConfig::default()).unwrap();

        let reply = app.answer("What is the price of BTC?").await;
        assert_eq!(reply.role, MessageRole::Archon);
        assert_eq!(reply.content, STILL_ANALYZING);

        let log = app.store().messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, MessageRole::User);
        assert!(!app.store().is_thinking());

        assert_eq!(app.bus().history(Some(EventKind::AiMessage), 10).len(), 2);
        assert_eq!(app.bus().history(Some(EventKind::AiThinking), 10).len(), 2);
    }

    #[tokio::test]
    async fn test_answer_error_uses_apology() {
        let app = Application::new(AppConfig::default()).unwrap();
        app.store()
            .set_market_data(tick("BTCUSDT", 100.0, 1.0, 101.0, 99.0))
            .unwrap();

        let reply = app.answer("price of XRPUSDT").await;
        assert_eq!(reply.content, ERROR_REPLY);
        assert!(!app.store().is_thinking());
    }

    #[tokio::test]
    async fn test_answer_from_bus_ticks() {
        let app = Application::new(AppConfig::default()).unwrap();
        app.bus().publish(
            EventKind::Tick,
            EventPayload::Tick(tick("BTCUSDT", 45_000.0, 2.0, 46_000.0, 44_000.0)),
            "test",
        );

        let reply = app.answer("btc price").await;
        assert!(reply.content.contains("BTCUSDT"));
        assert!(reply.context.is_some());
    }

    #[tokio::test]
    async fn test_volatility_alert_on_transition() {
        let app = Application::new(AppConfig::default()).unwrap();
        assert!(!app.report_status(false));

        // 20% range
        app.store()
            .set_market_data(tick("BTCUSDT", 100.0, 3.0, 110.0, 90.0))
            .unwrap();

        assert!(app.report_status(false));
        assert_eq!(app.store().alerts().len(), 1);
        assert_eq!(app.store().alerts()[0].kind, AlertKind::Risk);

        // still volatile, no new alert
        assert!(app.report_status(true));
        assert_eq!(app.store().alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_patterns_recorded_once_by_status() {
        let app = Application::new(AppConfig::default()).unwrap();
        app.store()
            .set_market_data(tick("BTCUSDT", 110.0, 1.0, 111.0, 109.0))
            .unwrap();
        for i in 0..10 {
            let base = 100.0 + i as f64;
            app.store()
                .push_candle(
                    "BTCUSDT",
                    Candle {
                        timestamp: i * 60_000,
                        open: base,
                        high: base + 2.0,
                        low: base - 1.0,
                        close: base + 1.0,
                        volume: 1.0,
                    },
                )
                .unwrap();
        }

        // queries alone never touch the pattern log
        app.answer("any pattern?").await;
        assert!(app.store().patterns().is_empty());

        app.report_status(false);
        app.report_status(false);
        let patterns = app.store().patterns();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].name, "Uptrend");
        assert_eq!(app.record_new_patterns(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let app = Application::new(AppConfig::default()).unwrap();
        app.bus().publish(
            EventKind::Tick,
            EventPayload::Tick(tick("ETHUSDT", 2_500.0, 1.0, 2_600.0, 2_400.0)),
            "test",
        );
        assert!(app.bus().subscriber_count(EventKind::Tick) > 0);

        app.shutdown().await;
        assert_eq!(app.bus().subscriber_count(EventKind::Tick), 0);
        assert_eq!(app.bus().history_len(), 0);
        assert_eq!(app.store().market_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.feeds = vec![
            FeedEntry {
                id: "a".to_string(),
                url: "ws://127.0.0.1:1".to_string(),
                reconnect: false,
                reconnect_delay_ms: 10,
                max_reconnect_attempts: 0,
            };
            2
        ];
        assert!(Application::new(config).is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let app = Application::new(AppConfig::default()).unwrap();
        let cancel = app.cancel_token();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), app.run())
            .await
            .unwrap()
            .unwrap();
    }
}
