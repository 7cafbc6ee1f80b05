//! Event types carried by the bus.

use chrono::{DateTime, Utc};
use nexus_core::{Alert, ArchonMessage, MarketTick, OrderBook, Trade};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of event kinds.
///
/// Market and connection kinds are owned by the core pipeline. UI
/// collaborators may publish navigation and panel kinds, which the core
/// never consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "market:tick")]
    Tick,
    #[serde(rename = "market:trade")]
    Trade,
    #[serde(rename = "market:orderbook")]
    OrderBook,
    #[serde(rename = "market:connected")]
    ConnectionOpened,
    #[serde(rename = "market:disconnected")]
    ConnectionClosed,
    #[serde(rename = "ui:navigate")]
    Navigate,
    #[serde(rename = "ui:panel:open")]
    PanelOpen,
    #[serde(rename = "ui:panel:close")]
    PanelClose,
    #[serde(rename = "alert:new")]
    Alert,
    #[serde(rename = "alert:dismiss")]
    AlertDismiss,
    #[serde(rename = "ai:message")]
    AiMessage,
    #[serde(rename = "ai:thinking")]
    AiThinking,
}

impl EventKind {
    /// Stable wire name, also used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tick => "market:tick",
            Self::Trade => "market:trade",
            Self::OrderBook => "market:orderbook",
            Self::ConnectionOpened => "market:connected",
            Self::ConnectionClosed => "market:disconnected",
            Self::Navigate => "ui:navigate",
            Self::PanelOpen => "ui:panel:open",
            Self::PanelClose => "ui:panel:close",
            Self::Alert => "alert:new",
            Self::AlertDismiss => "alert:dismiss",
            Self::AiMessage => "ai:message",
            Self::AiThinking => "ai:thinking",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum EventPayload {
    Tick(MarketTick),
    Trade(Trade),
    OrderBook(OrderBook),
    /// Connection lifecycle notification for a feed id.
    Connection { id: String },
    Alert(Alert),
    AlertDismissed { id: String },
    Message(ArchonMessage),
    Thinking(bool),
    /// Opaque UI-origin payload.
    Ui(serde_json::Value),
}

/// An immutable published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl Event {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(kind: EventKind, payload: EventPayload, source: impl Into<String>) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names_match_serde() {
        for kind in [
            EventKind::Tick,
            EventKind::ConnectionOpened,
            EventKind::PanelClose,
            EventKind::AiThinking,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}
