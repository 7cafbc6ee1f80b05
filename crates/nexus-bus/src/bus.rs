//! Event bus implementation.

use crate::event::{Event, EventKind, EventPayload};
use nexus_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace};

/// Default number of events retained for diagnostics.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Error returned by a handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a handler.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

struct BusInner {
    handlers: RwLock<HashMap<EventKind, Vec<(u64, Handler)>>>,
    history: Mutex<VecDeque<Arc<Event>>>,
    capacity: usize,
    next_id: AtomicU64,
}

/// In-process publish/subscribe hub.
///
/// Cloning is cheap; all clones share subscribers and history.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus retaining at most `history_capacity` events.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(HashMap::new()),
                history: Mutex::new(VecDeque::with_capacity(history_capacity.min(4096))),
                capacity: history_capacity,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for `kind`.
    ///
    /// The handler only sees events published after this call returns.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(kind = %kind, handler_id = id, "Handler subscribed");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Publish an event and dispatch it synchronously.
    ///
    /// The event is appended to history first, then every handler that is
    /// registered for `kind` at this moment is invoked. A failing handler is
    /// logged and counted; it never stops dispatch to the others.
    pub fn publish(
        &self,
        kind: EventKind,
        payload: EventPayload,
        source: impl Into<String>,
    ) -> Arc<Event> {
        let event = Arc::new(Event::new(kind, payload, source));

        if self.inner.capacity > 0 {
            let mut history = self.inner.history.lock();
            while history.len() >= self.inner.capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        Metrics::event_published(kind.as_str());

        // Snapshot so handlers may (un)subscribe while being dispatched.
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        trace!(kind = %kind, handlers = handlers.len(), "Dispatching event");

        for handler in &handlers {
            dispatch_one(handler, &event);
        }

        event
    }

    /// Most recent `limit` events, optionally filtered by kind, oldest first.
    pub fn history(&self, kind: Option<EventKind>, limit: usize) -> Vec<Arc<Event>> {
        let history = self.inner.history.lock();
        let matching: Vec<&Arc<Event>> = history
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Number of events currently retained.
    pub fn history_len(&self) -> usize {
        self.inner.history.lock().len()
    }

    /// Number of handlers registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .read()
            .get(&kind)
            .map_or(0, |list| list.len())
    }

    /// Drop every subscription and all history. Used at teardown.
    pub fn clear(&self) {
        self.inner.handlers.write().clear();
        self.inner.history.lock().clear();
        debug!("Event bus cleared");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

fn dispatch_one(handler: &Handler, event: &Event) {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(kind = %event.kind, source = %event.source, error = %e, "Event handler failed");
            Metrics::handler_fault(event.kind.as_str());
        }
        Err(panic) => {
            error!(
                kind = %event.kind,
                source = %event.source,
                panic = %panic_message(&*panic),
                "Event handler panicked"
            );
            Metrics::handler_fault(event.kind.as_str());
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Remove exactly this handler. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut handlers = inner.handlers.write();
        if let Some(list) = handlers.get_mut(&self.kind) {
            let before = list.len();
            list.retain(|(id, _)| *id != self.id);
            if list.len() != before {
                debug!(kind = %self.kind, handler_id = self.id, "Handler unsubscribed");
            }
        }
    }
}
