#![forbid(unsafe_code)]

//! Helper capabilities shared by every managed store.
//!
//! Each helper acquires something (a timer, an event handler, a reaction, a
//! nested group) and records how to release it in the host's [`Resources`].
//! The traits are blanket-implemented for any [`ResourceHost`], which covers
//! both the construction [`Scope`](crate::managed::Scope) and the finished
//! [`Managed`](crate::managed::Managed) instance.
//!
//! | Trait            | Helpers                                                     |
//! |------------------|-------------------------------------------------------------|
//! | [`Disposables`]  | `add_disposable`, `create_composite_disposable`, `register_owned` |
//! | [`Timers`]       | `set_timeout`, `set_interval`                               |
//! | [`EventRegistry`]| `add_event`                                                 |
//! | [`Reactivity`]   | `react`, `watch`                                            |
//! | [`RefRegistry`]  | `make_ref`                                                  |

use std::fmt;

use storekeep_core::capability::Capabilities;
use storekeep_core::disposable::{CompositeDisposable, Disposable};
use storekeep_core::error::{CapabilityError, ReleaseError};
use storekeep_core::owned::{Owned, OwnedRegistry};
use tracing::{trace, warn};
use web_time::Duration;

use crate::events::EventHub;
use crate::reactive::{Observable, Subscription};
use crate::refs::{Ref, RefTable};
use crate::timers::{Scheduler, TimerHandle};

// ─── Resources ───────────────────────────────────────────────────────────────

/// Everything one store has to release.
///
/// Release order is fixed: the composite group first, then owned entries in
/// registration order, then ref slots are emptied. Dropping unreleased
/// resources releases them.
#[derive(Default)]
pub struct Resources {
    subscriptions: CompositeDisposable,
    owned: OwnedRegistry,
    refs: RefTable,
    released: bool,
}

impl Resources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The store's own composite group.
    #[must_use]
    pub fn subscriptions(&self) -> &CompositeDisposable {
        &self.subscriptions
    }

    pub fn add(&self, disposable: Disposable) {
        self.subscriptions.add(disposable);
    }

    /// Keep `subscription` alive until release.
    pub fn hold(&self, subscription: Subscription) {
        self.add(Disposable::new(move || drop(subscription)));
    }

    pub fn register_owned(&mut self, resource: impl Owned + 'static) -> Result<(), ReleaseError> {
        self.owned.register(resource)
    }

    pub fn slot<T: 'static>(&mut self, name: &str) -> Ref<T> {
        self.refs.slot(name)
    }

    /// Number of owned entries awaiting release.
    #[must_use]
    pub fn owned_len(&self) -> usize {
        self.owned.len()
    }

    /// Release everything, returning owned-entry failures. Later calls
    /// return nothing.
    pub fn release(&mut self) -> Vec<ReleaseError> {
        if self.released {
            return Vec::new();
        }
        self.released = true;
        trace!(
            members = self.subscriptions.len(),
            owned = self.owned.len(),
            "releasing resources"
        );
        self.subscriptions.dispose();
        let failures = self.owned.release_all();
        self.refs.clear_all();
        failures
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for failure in self.release() {
            warn!(error = %failure, "release failed while dropping resources");
        }
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources")
            .field("subscriptions", &self.subscriptions)
            .field("owned", &self.owned)
            .field("refs", &self.refs)
            .field("released", &self.released)
            .finish()
    }
}

// ─── Host ────────────────────────────────────────────────────────────────────

/// Something that owns [`Resources`] and may hold a timer scheduler.
pub trait ResourceHost {
    fn resources(&mut self) -> &mut Resources;
    fn scheduler(&self) -> Option<&Scheduler>;
}

// ─── Capability traits ───────────────────────────────────────────────────────

/// Direct registration of releasable things.
pub trait Disposables: ResourceHost {
    /// Release `disposable` together with the store.
    fn add_disposable(&mut self, disposable: Disposable) {
        self.resources().add(disposable);
    }

    /// A fresh group released together with the store.
    fn create_composite_disposable(&mut self) -> CompositeDisposable {
        let group = CompositeDisposable::new();
        self.resources().add(group.as_disposable());
        group
    }

    /// Make the store responsible for a child model or subscription-like
    /// value.
    fn register_owned(&mut self, resource: impl Owned + 'static) -> Result<(), ReleaseError> {
        self.resources().register_owned(resource)
    }
}

impl<H: ResourceHost + ?Sized> Disposables for H {}

/// Timeouts and intervals cancelled when the store is disposed.
pub trait Timers: ResourceHost {
    fn set_timeout(
        &mut self,
        delay: Duration,
        callback: impl FnMut() + 'static,
    ) -> Result<TimerHandle, CapabilityError> {
        let scheduler = timer_scheduler(self)?;
        let id = scheduler.set_timeout(delay, callback);
        Ok(track_timer(self, TimerHandle::new(id, scheduler)))
    }

    fn set_interval(
        &mut self,
        period: Duration,
        callback: impl FnMut() + 'static,
    ) -> Result<TimerHandle, CapabilityError> {
        let scheduler = timer_scheduler(self)?;
        let id = scheduler.set_interval(period, callback);
        Ok(track_timer(self, TimerHandle::new(id, scheduler)))
    }
}

impl<H: ResourceHost + ?Sized> Timers for H {}

fn timer_scheduler<H: ResourceHost + ?Sized>(host: &H) -> Result<Scheduler, CapabilityError> {
    host.scheduler()
        .cloned()
        .ok_or(CapabilityError::Missing(Capabilities::TIMERS.label()))
}

fn track_timer<H: ResourceHost + ?Sized>(host: &mut H, handle: TimerHandle) -> TimerHandle {
    let cancel = handle.clone();
    host.resources().add(Disposable::new(move || {
        cancel.cancel();
    }));
    handle
}

/// Event handlers detached when the store is disposed.
pub trait EventRegistry: ResourceHost {
    fn add_event<T: 'static>(
        &mut self,
        source: &EventHub<T>,
        name: &str,
        handler: impl Fn(&T) + 'static,
    ) {
        let sub = source.on(name, handler);
        self.resources().hold(sub);
    }
}

impl<H: ResourceHost + ?Sized> EventRegistry for H {}

/// Reactions to observable values, stopped when the store is disposed.
pub trait Reactivity: ResourceHost {
    /// Run `effect` after every change of `source`.
    fn react<T: Clone + PartialEq + 'static>(
        &mut self,
        source: &Observable<T>,
        effect: impl Fn(&T) + 'static,
    ) {
        let sub = source.subscribe(effect);
        self.resources().hold(sub);
    }

    /// Run `effect` with the current value now, then after every change.
    fn watch<T: Clone + PartialEq + 'static>(
        &mut self,
        source: &Observable<T>,
        effect: impl Fn(&T) + 'static,
    ) {
        source.with(&effect);
        self.react(source, effect);
    }
}

impl<H: ResourceHost + ?Sized> Reactivity for H {}

/// Named ref slots emptied when the store is disposed.
pub trait RefRegistry: ResourceHost {
    fn make_ref<T: 'static>(&mut self, name: &str) -> Ref<T> {
        self.resources().slot(name)
    }
}

impl<H: ResourceHost + ?Sized> RefRegistry for H {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
