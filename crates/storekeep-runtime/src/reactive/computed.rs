#![forbid(unsafe_code)]

//! Derived values for stores.
//!
//! A [`Computed<T>`] caches the result of a function over one or more
//! [`Observable`] sources. A source change only flags the cache; the function
//! runs again on the next read. Stores usually build computed values in
//! [`Store::construct`](crate::managed::Store::construct) and register them
//! as owned models, so disposing the store detaches them from their sources.
//!
//! # Invariants
//!
//! 1. While attached, a read reflects the current source values.
//! 2. Reads between two source changes share one evaluation.
//! 3. `version()` counts evaluations.
//!
//! # Failure Modes
//!
//! - **Evaluation panics**: the previous cached value survives and the flag
//!   stays set, so the next read evaluates again.
//! - **Detached**: the last cached value is kept and no source can flag it
//!   again. [`invalidate`](Computed::invalidate) still forces a re-read.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use storekeep_core::error::ReleaseError;
use storekeep_core::owned::{Owned, OwnedShape};

use super::observable::{Observable, Subscription};

struct ComputedInner<T> {
    compute: Box<dyn Fn() -> T>,
    /// `None` only before the first computation.
    cached: Option<T>,
    dirty: Cell<bool>,
    version: u64,
    /// Guards keeping the dependency callbacks registered.
    subscriptions: Vec<Subscription>,
}

impl<T> ComputedInner<T> {
    fn refresh(&mut self) -> &T {
        if self.dirty.get() || self.cached.is_none() {
            let value = (self.compute)();
            self.cached = Some(value);
            self.dirty.set(false);
            self.version += 1;
        }
        self.cached.get_or_insert_with(|| (self.compute)())
    }
}

/// Memoized function of observable sources.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    inner: Rc<RefCell<ComputedInner<T>>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Computed")
            .field("cached", &inner.cached)
            .field("dirty", &inner.dirty.get())
            .field("version", &inner.version)
            .field("attached", &!inner.subscriptions.is_empty())
            .finish()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// `map` applied to one source.
    pub fn from_observable<S: Clone + PartialEq + 'static>(
        source: &Observable<S>,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let source_clone = source.clone();
        let computed = Self::from_fn(move || source_clone.with(|v| map(v)), Vec::new());
        computed.track(source);
        computed
    }

    /// `map` applied to two sources.
    pub fn from2<S1, S2>(
        s1: &Observable<S1>,
        s2: &Observable<S2>,
        map: impl Fn(&S1, &S2) -> T + 'static,
    ) -> Self
    where
        S1: Clone + PartialEq + 'static,
        S2: Clone + PartialEq + 'static,
    {
        let s1_clone = s1.clone();
        let s2_clone = s2.clone();
        let computed = Self::from_fn(
            move || s1_clone.with(|v1| s2_clone.with(|v2| map(v1, v2))),
            Vec::new(),
        );
        computed.track(s1);
        computed.track(s2);
        computed
    }

    /// Wrap an arbitrary function. `subscriptions` are held until
    /// [`detach`](Self::detach) but never flag the cache; use
    /// [`track`](Self::track) or [`invalidate`](Self::invalidate) for that.
    pub fn from_fn(compute: impl Fn() -> T + 'static, subscriptions: Vec<Subscription>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ComputedInner {
                compute: Box::new(compute),
                cached: None,
                dirty: Cell::new(true),
                version: 0,
                subscriptions,
            })),
        }
    }

    /// Mark this value dirty whenever `source` changes.
    pub fn track<S: Clone + PartialEq + 'static>(&self, source: &Observable<S>) {
        let weak_inner = Rc::downgrade(&self.inner);
        let sub = source.subscribe(move |_| {
            if let Some(strong) = weak_inner.upgrade() {
                strong.borrow().dirty.set(true);
            }
        });
        self.inner.borrow_mut().subscriptions.push(sub);
    }

    /// The current value, evaluating first if a source changed.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow_mut().refresh().clone()
    }

    /// Borrow the current value.
    ///
    /// # Panics
    ///
    /// If `f` reads this same `Computed` again.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let mut inner = self.inner.borrow_mut();
        f(inner.refresh())
    }
}

impl<T> Computed<T> {
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty.get()
    }

    /// Flag the cache without a source change.
    pub fn invalidate(&self) {
        self.inner.borrow().dirty.set(true);
    }

    /// Number of evaluations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Drop every dependency subscription. The cached value is kept.
    pub fn detach(&self) {
        let subs = std::mem::take(&mut self.inner.borrow_mut().subscriptions);
        drop(subs);
    }

    /// Whether any dependency subscription is still held.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        !self.inner.borrow().subscriptions.is_empty()
    }
}

impl<T: 'static> Owned for Computed<T> {
    fn shape(&self) -> OwnedShape {
        OwnedShape::MODEL
    }

    fn dispose(&mut self) -> Result<(), ReleaseError> {
        self.detach();
        Ok(())
    }

    fn label(&self) -> &'static str {
        "Computed"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
