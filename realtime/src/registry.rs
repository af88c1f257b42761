// Handler registry for inbound push messages

use common::Envelope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

pub type Handler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Callbacks keyed by event type, kept in registration order
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_type: &str, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.entry(event_type.to_string()).or_default().push((id, handler));
        id
    }

    /// Remove one registration; false if it was already gone
    pub fn remove(&self, event_type: &str, id: u64) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let Some(list) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.get(event_type).map_or(0, Vec::len)
    }

    /// Invoke every handler for the envelope's type; returns how many ran
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        // Snapshot first so handlers may (un)subscribe while running
        let matching: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers
                .get(&envelope.event_type)
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        if matching.is_empty() {
            debug!("No handlers for {}", envelope.event_type);
        }
        for handler in &matching {
            handler(&envelope.data);
        }
        matching.len()
    }
}

/// Handle for one registration
#[must_use = "dropping a Subscription keeps the handler registered; call unsubscribe() to remove it"]
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    event_type: String,
    id: u64,
}

impl Subscription {
    pub(crate) fn new(registry: &Arc<HandlerRegistry>, event_type: &str, id: u64) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            event_type: event_type.to_string(),
            id,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove exactly this registration
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.remove(&self.event_type, self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Handler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_for_handlers = seen.clone();
        let make = move |label: &'static str| -> Handler {
            let seen = seen_for_handlers.clone();
            Arc::new(move |_data: &serde_json::Value| seen.lock().unwrap().push(label.to_string()))
        };
        (seen, make)
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = HandlerRegistry::new();
        let (seen, make) = counter();
        registry.register("price_update", make("a"));
        registry.register("price_update", make("b"));
        registry.register("signal_update", make("other"));

        let ran = registry.dispatch(&Envelope::new("price_update", json!({})));
        assert_eq!(ran, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_its_registration() {
        let registry = Arc::new(HandlerRegistry::new());
        let (seen, make) = counter();

        let first = Subscription::new(&registry, "price_update", registry.register("price_update", make("first")));
        let _second = Subscription::new(&registry, "price_update", registry.register("price_update", make("second")));

        assert!(first.unsubscribe());
        assert_eq!(registry.handler_count("price_update"), 1);

        registry.dispatch(&Envelope::new("price_update", json!({})));
        assert_eq!(*seen.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_same_closure_registered_twice_is_two_registrations() {
        let registry = Arc::new(HandlerRegistry::new());
        let (seen, make) = counter();
        let handler = make("dup");

        let one = Subscription::new(&registry, "signal_update", registry.register("signal_update", handler.clone()));
        let _two = Subscription::new(&registry, "signal_update", registry.register("signal_update", handler));

        assert!(one.unsubscribe());
        registry.dispatch(&Envelope::new("signal_update", json!(null)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = Arc::new(HandlerRegistry::new());
        let (_, make) = counter();
        let sub = Subscription::new(&registry, "x", registry.register("x", make("x")));
        drop(registry);
        assert!(!sub.unsubscribe());
    }
}
