//! Synchronous, typed publish/subscribe.
//!
//! Handlers receive the event by reference plus a mutable context `C` (for a
//! game server, the whole game state). [`EventBus::publish`] runs every
//! handler registered for the event type, in subscription order, before it
//! returns. There is no queueing and no cross-thread dispatch.

use std::any::{Any, TypeId};
use std::collections::HashMap;

type Handler<E, C> = Box<dyn FnMut(&E, &mut C)>;

/// Typed event dispatcher over a context `C`.
pub struct EventBus<C> {
    /// `TypeId::of::<E>()` -> `Vec<Handler<E, C>>`.
    handlers: HashMap<TypeId, Box<dyn Any>>,
    _context: std::marker::PhantomData<fn(&mut C)>,
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            _context: std::marker::PhantomData,
        }
    }
}

impl<C> std::fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.handlers.len())
            .finish()
    }
}

impl<C: 'static> EventBus<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of type `E`. Handlers run in the order
    /// they were subscribed.
    pub fn subscribe<E: 'static>(&mut self, handler: impl FnMut(&E, &mut C) + 'static) {
        let slot = self
            .handlers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<Handler<E, C>>::new()));
        if let Some(list) = slot.downcast_mut::<Vec<Handler<E, C>>>() {
            list.push(Box::new(handler));
        }
    }

    /// Invoke every handler for `E`. Returns how many ran.
    pub fn publish<E: 'static>(&mut self, event: &E, context: &mut C) -> usize {
        let Some(list) = self
            .handlers
            .get_mut(&TypeId::of::<E>())
            .and_then(|h| h.downcast_mut::<Vec<Handler<E, C>>>())
        else {
            tracing::trace!(event = std::any::type_name::<E>(), "no subscribers");
            return 0;
        };
        for handler in list.iter_mut() {
            handler(event, context);
        }
        list.len()
    }

    pub fn handler_count<E: 'static>(&self) -> usize {
        self.handlers
            .get(&TypeId::of::<E>())
            .and_then(|h| h.downcast_ref::<Vec<Handler<E, C>>>())
            .map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Created(u32);
    struct Destroyed(u32);

    #[derive(Default)]
    struct Log(Vec<String>);

    #[test]
    fn handlers_run_in_subscription_order() {
        let mut bus = EventBus::<Log>::new();
        bus.subscribe(|e: &Created, log: &mut Log| log.0.push(format!("a{}", e.0)));
        bus.subscribe(|e: &Created, log: &mut Log| log.0.push(format!("b{}", e.0)));

        let mut log = Log::default();
        assert_eq!(bus.publish(&Created(1), &mut log), 2);
        assert_eq!(log.0, vec!["a1", "b1"]);
    }

    #[test]
    fn events_are_routed_by_type() {
        let mut bus = EventBus::<Log>::new();
        bus.subscribe(|e: &Created, log: &mut Log| log.0.push(format!("c{}", e.0)));
        bus.subscribe(|e: &Destroyed, log: &mut Log| log.0.push(format!("d{}", e.0)));

        let mut log = Log::default();
        bus.publish(&Destroyed(7), &mut log);
        assert_eq!(log.0, vec!["d7"]);
        assert_eq!(bus.handler_count::<Created>(), 1);
        assert_eq!(bus.handler_count::<String>(), 0);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let mut bus = EventBus::<Log>::new();
        let mut log = Log::default();
        assert_eq!(bus.publish(&Created(0), &mut log), 0);
        assert!(log.0.is_empty());
    }

    #[test]
    fn handlers_keep_state_between_publishes() {
        let mut bus = EventBus::<Log>::new();
        let mut seen = 0;
        bus.subscribe(move |_: &Created, log: &mut Log| {
            seen += 1;
            log.0.push(seen.to_string());
        });
        let mut log = Log::default();
        bus.publish(&Created(0), &mut log);
        bus.publish(&Created(0), &mut log);
        assert_eq!(log.0, vec!["1", "2"]);
    }
}
