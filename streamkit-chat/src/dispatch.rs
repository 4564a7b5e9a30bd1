//! Event fan-out to subscribers.
//!
//! Decoupled from parsing and connection concerns: the connection task
//! calls [`EventDispatcher::publish`] and every handler registered for
//! that event's variant runs in registration order. A failing handler is
//! logged and never stops delivery to the rest. Publishing snapshots the
//! registration list first, so subscribing or unsubscribing concurrently
//! with a publish neither corrupts nor skips in-flight dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::{ChatEvent, EventKind};

/// What a handler returns; errors are captured and logged, never
/// re-thrown into the publishing path.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = Arc<dyn Fn(&ChatEvent) -> HandlerResult + Send + Sync>;

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    /// `None` subscribes to every variant.
    kind: Option<EventKind>,
    handler: Handler,
}

#[derive(Default)]
pub struct EventDispatcher {
    registry: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event variant.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Register a handler for every event variant.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ChatEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write();
        let before = registry.len();
        registry.retain(|r| r.id != id);
        registry.len() != before
    }

    /// Deliver an event to all matching handlers in registration order.
    ///
    /// Synchronous: returns only after every handler has run or had its
    /// error captured, which preserves per-connection event ordering when
    /// called from the single pump task.
    pub fn publish(&self, event: &ChatEvent) {
        let kind = event.kind();
        let matching: Vec<(SubscriptionId, Handler)> = self
            .registry
            .read()
            .iter()
            .filter(|r| r.kind.is_none() || r.kind == Some(kind))
            .map(|r| (r.id, Arc::clone(&r.handler)))
            .collect();

        for (id, handler) in matching {
            if let Err(e) = handler(event) {
                tracing::warn!(
                    subscription = id.0,
                    event = ?kind,
                    error = %e,
                    "event handler failed"
                );
            }
        }
    }

    fn register(&self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry.write().push(Registration { id, kind, handler });
        id
    }
}
