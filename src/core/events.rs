//! Named-event dispatch registry
//!
//! Decouples room and routing logic from the transport layer: producers
//! dispatch [`BusEvent`]s by name, the connection registry listens. The bus
//! is an explicitly constructed instance handed to each component; there is
//! deliberately no global.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, warn};

use crate::core::message::Outbound;

/// Outbound send intents consumed by the connection registry.
pub const EVENT_SEND: &str = "socket-send";
/// A room's membership reached zero; the directory must delete it.
pub const EVENT_ROOM_REMOVE: &str = "room-remove";

#[derive(Debug, Clone)]
pub enum BusEvent {
    Send(SendIntent),
    RoomRemoved(String),
}

/// A message addressed to a specific set of connections. Transient per
/// dispatch, never persisted.
#[derive(Debug, Clone)]
pub struct SendIntent {
    pub sockets: Vec<String>,
    pub message: Outbound,
}

pub type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Handle for detaching a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct EventSlot {
    listeners: Vec<(ListenerId, Listener)>,
}

pub struct EventBus {
    events: Mutex<HashMap<String, EventSlot>>,
    next_listener: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Create an empty listener list for `name`. Registering an existing
    /// name keeps its listeners.
    pub fn register(&self, name: &str) {
        let mut events = self.lock();
        events.entry(name.to_string()).or_default();
    }

    pub fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Attach a listener; returns `None` (and logs) for unregistered names.
    pub fn add_listener(
        &self,
        name: &str,
        listener: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Option<ListenerId> {
        let mut events = self.lock();
        match events.get_mut(name) {
            Some(slot) => {
                let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
                slot.listeners.push((id, Arc::new(listener)));
                Some(id)
            }
            None => {
                warn!("add_listener on unregistered event '{}'", name);
                None
            }
        }
    }

    pub fn remove_listener(&self, name: &str, id: ListenerId) {
        let mut events = self.lock();
        if let Some(slot) = events.get_mut(name) {
            slot.listeners.retain(|(lid, _)| *lid != id);
        }
    }

    /// Invoke every listener of `name` in registration order, synchronously.
    ///
    /// The listener list is cloned out of the lock first, so listeners may
    /// register/detach or dispatch further events. Each invocation is
    /// isolated: a panicking listener never starves the rest.
    pub fn dispatch(&self, name: &str, event: BusEvent) {
        let listeners: Vec<Listener> = {
            let events = self.lock();
            match events.get(name) {
                Some(slot) => slot.listeners.iter().map(|(_, l)| l.clone()).collect(),
                None => {
                    warn!("dispatch on unregistered event '{}'", name);
                    return;
                }
            }
        };

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!("listener for event '{}' panicked", name);
            }
        }
    }

    /// Shorthand for dispatching a send intent.
    pub fn send(&self, sockets: Vec<String>, message: Outbound) {
        self.dispatch(EVENT_SEND, BusEvent::Send(SendIntent { sockets, message }));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, EventSlot>> {
        // A poisoned lock keeps the last consistent listener table
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_listener(counter: Arc<AtomicUsize>) -> impl Fn(&BusEvent) + Send + Sync {
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_register_and_has() {
        let bus = EventBus::new();
        assert!(!bus.has(EVENT_SEND));
        bus.register(EVENT_SEND);
        assert!(bus.has(EVENT_SEND));
    }

    #[test]
    fn test_register_is_idempotent() {
        let bus = EventBus::new();
        bus.register(EVENT_SEND);
        let counter = Arc::new(AtomicUsize::new(0));
        bus.add_listener(EVENT_SEND, counting_listener(counter.clone()));

        // re-registering must not drop existing listeners
        bus.register(EVENT_SEND);
        bus.send(vec![], Outbound::error("x"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_reaches_all_listeners_in_order() {
        let bus = EventBus::new();
        bus.register("test");
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let order = order.clone();
            bus.add_listener("test", move |_| order.lock().unwrap().push(tag));
        }

        bus.dispatch("test", BusEvent::RoomRemoved("0".to_string()));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_listener() {
        let bus = EventBus::new();
        bus.register("test");
        let counter = Arc::new(AtomicUsize::new(0));
        let id = bus
            .add_listener("test", counting_listener(counter.clone()))
            .unwrap();

        bus.dispatch("test", BusEvent::RoomRemoved("0".to_string()));
        bus.remove_listener("test", id);
        bus.dispatch("test", BusEvent::RoomRemoved("0".to_string()));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_name_is_a_noop() {
        let bus = EventBus::new();
        assert!(bus.add_listener("nope", |_| ()).is_none());
        // must not panic
        bus.dispatch("nope", BusEvent::RoomRemoved("0".to_string()));
    }

    #[test]
    fn test_panicking_listener_does_not_starve_the_rest() {
        let bus = EventBus::new();
        bus.register("test");
        bus.add_listener("test", |_| panic!("boom"));
        let counter = Arc::new(AtomicUsize::new(0));
        bus.add_listener("test", counting_listener(counter.clone()));

        bus.dispatch("test", BusEvent::RoomRemoved("0".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
