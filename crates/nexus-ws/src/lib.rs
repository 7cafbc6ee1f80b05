//! WebSocket feed connections for nexus.
//!
//! Provides independently addressed streaming connections with:
//! - Fixed-delay automatic reconnection bounded by a retry budget
//! - Tagged decoding of trade/ticker payloads into domain events
//! - Publication of normalized events on the event bus
//! - Best-effort outbound sends on open connections

pub mod connection;
pub mod error;
pub mod message;

pub use connection::{ConnectionState, FeedConfig, FeedManager, FEED_SOURCE};
pub use error::{WsError, WsResult};
pub use message::{decode_feed_message, FeedMessage, FeedUpdate, RawTicker, RawTrade};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
