#![forbid(unsafe_code)]

//! Version-tracked observable values and their subscription guards.
//!
//! # Design
//!
//! [`Observable<T>`] keeps its value, a version counter, and a list of `Weak`
//! subscriber callbacks behind `Rc<RefCell<..>>`. [`subscribe`] hands back a
//! [`Subscription`] holding the only strong reference to the callback, so
//! dropping the guard (or calling [`Subscription::unsubscribe`]) is all it
//! takes to stop notifications. Dead entries are pruned on the next
//! notification.
//!
//! Subscribers receive a snapshot of the new value taken after the borrow is
//! released, so a callback may read or even set the observable it watches.
//!
//! [`subscribe`]: Observable::subscribe

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use storekeep_core::error::ReleaseError;
use storekeep_core::owned::{Owned, OwnedShape};

/// Boxed subscriber callback shared between a source and its guard.
pub(crate) struct Callback<T>(pub(crate) Box<dyn Fn(&T)>);

// ─── Subscription ────────────────────────────────────────────────────────────

/// RAII guard for a subscriber callback.
///
/// The callback stays registered while the guard is alive and active.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    guard: Option<Rc<dyn Any>>,
}

impl Subscription {
    pub(crate) fn new(guard: Rc<dyn Any>) -> Self {
        Self { guard: Some(guard) }
    }

    /// Stop receiving notifications. Later calls do nothing.
    pub fn unsubscribe(&mut self) {
        self.guard = None;
    }

    /// Whether the callback is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Owned for Subscription {
    fn shape(&self) -> OwnedShape {
        OwnedShape::SUBSCRIPTION
    }

    fn unsubscribe(&mut self) -> Result<(), ReleaseError> {
        Subscription::unsubscribe(self);
        Ok(())
    }

    fn label(&self) -> &'static str {
        "Subscription"
    }
}

// ─── Observable ──────────────────────────────────────────────────────────────

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** value.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// A clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value.
    ///
    /// # Panics
    ///
    /// Panics if the closure sets this observable (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        let snapshot = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version += 1;
            inner.value.clone()
        };
        self.notify(&snapshot);
    }

    /// Mutate the value in place, notifying subscribers if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Register a callback invoked with the new value after each change.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong = Rc::new(Callback(Box::new(callback)));
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Number of changes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn notify(&self, value: &T) {
        let live: Vec<Rc<Callback<T>>> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner.subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in live {
            (callback.0)(value);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
