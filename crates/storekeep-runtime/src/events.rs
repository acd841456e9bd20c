#![forbid(unsafe_code)]

//! Named event dispatch.
//!
//! [`EventHub<T>`] is the event source that stores attach handlers to with
//! [`EventRegistry::add_event`](crate::capabilities::EventRegistry::add_event).
//! Handlers are held weakly, like [`Observable`](crate::reactive::Observable)
//! subscribers: the returned [`Subscription`] owns them.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::reactive::Subscription;
use crate::reactive::observable::Callback;

struct HubInner<T> {
    handlers: Vec<(String, Weak<Callback<T>>)>,
}

/// Event source keyed by event name.
///
/// Cloning an `EventHub` creates a new handle to the **same** handler list.
pub struct EventHub<T> {
    inner: Rc<RefCell<HubInner<T>>>,
}

impl<T> Clone for EventHub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(HubInner {
                handlers: Vec::new(),
            })),
        }
    }
}

impl<T: 'static> EventHub<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler for `name`. It runs until the subscription is
    /// dropped or unsubscribed.
    pub fn on(&self, name: impl Into<String>, handler: impl Fn(&T) + 'static) -> Subscription {
        let strong = Rc::new(Callback(Box::new(handler)));
        self.inner
            .borrow_mut()
            .handlers
            .push((name.into(), Rc::downgrade(&strong)));
        Subscription::new(strong)
    }

    /// Call every live handler for `name` in attach order. Returns how many
    /// ran.
    pub fn emit(&self, name: &str, payload: &T) -> usize {
        let live: Vec<Rc<Callback<T>>> = {
            let mut inner = self.inner.borrow_mut();
            inner.handlers.retain(|(_, w)| w.strong_count() > 0);
            inner
                .handlers
                .iter()
                .filter(|(n, _)| n == name)
                .filter_map(|(_, w)| w.upgrade())
                .collect()
        };
        for handler in &live {
            (handler.0)(payload);
        }
        live.len()
    }

    /// Number of live handlers for `name`.
    #[must_use]
    pub fn handler_count(&self, name: &str) -> usize {
        self.inner
            .borrow()
            .handlers
            .iter()
            .filter(|(n, w)| n == name && w.strong_count() > 0)
            .count()
    }
}

impl<T> fmt::Debug for EventHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.inner.borrow().handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn emit_reaches_matching_handlers_only() {
        let hub = EventHub::<u32>::new();
        let clicks = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&clicks);
        let _click = hub.on("click", move |v| c.set(c.get() + v));
        let _key = hub.on("key", |_| panic!("wrong event"));

        assert_eq!(hub.emit("click", &3), 1);
        assert_eq!(clicks.get(), 3);
        assert_eq!(hub.emit("scroll", &1), 0);
    }

    #[test]
    fn dropped_subscription_detaches_handler() {
        let hub = EventHub::<()>::new();
        let sub = hub.on("tick", |_| {});
        assert_eq!(hub.handler_count("tick"), 1);
        drop(sub);
        assert_eq!(hub.handler_count("tick"), 0);
        assert_eq!(hub.emit("tick", &()), 0);
    }

    #[test]
    fn handler_may_emit_again() {
        let hub = EventHub::<u8>::new();
        let seen = Rc::new(Cell::new(0u32));
        let s = Rc::clone(&seen);
        let inner_hub = hub.clone();
        let _a = hub.on("outer", move |_| {
            inner_hub.emit("inner", &0);
        });
        let _b = hub.on("inner", move |_| s.set(s.get() + 1));
        hub.emit("outer", &0);
        assert_eq!(seen.get(), 1);
    }
}
