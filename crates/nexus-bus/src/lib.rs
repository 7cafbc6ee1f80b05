//! In-process publish/subscribe event bus.
//!
//! Decouples producers (feed connections) from consumers (market store,
//! analysis triggers, UI collaborators):
//! - Synchronous, best-effort dispatch in the publishing thread
//! - Per-handler fault isolation (errors and panics are logged and counted)
//! - Bounded FIFO event history for diagnostics

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{EventBus, HandlerError, HandlerResult, Subscription, DEFAULT_HISTORY_CAPACITY};
pub use error::{BusError, BusResult};
pub use event::{Event, EventKind, EventPayload};
