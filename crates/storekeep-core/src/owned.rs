#![forbid(unsafe_code)]

//! Explicit registry of child-owned resources.
//!
//! A managed instance is responsible for releasing the child models and
//! subscription-like objects it holds. Instead of discovering them by
//! inspecting fields at teardown, each one is registered with an
//! [`OwnedRegistry`] at the point it is acquired.
//!
//! An [`Owned`] value declares its [`OwnedShape`]:
//!
//! - [`OwnedShape::MODEL`]: cascades via [`Owned::dispose`].
//! - [`OwnedShape::SUBSCRIPTION`]: released via [`Owned::unsubscribe`].
//!
//! The two shapes are independent. A value carrying both has `dispose`
//! called first, then `unsubscribe`.
//!
//! # Invariants
//!
//! 1. Entries are released in registration order.
//! 2. Each entry is released at most once; the registry is empty afterwards.
//! 3. A failing entry never prevents later entries from being released.
//! 4. Registering after release releases the entry immediately.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::error::ReleaseError;

bitflags::bitflags! {
    /// Which release operations an owned value supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OwnedShape: u8 {
        const MODEL        = 0b01;
        const SUBSCRIPTION = 0b10;
    }
}

/// A value a managed instance must release when it is disposed.
pub trait Owned {
    /// Which of [`dispose`](Self::dispose) and
    /// [`unsubscribe`](Self::unsubscribe) apply to this value.
    fn shape(&self) -> OwnedShape;

    /// Cascade disposal into a child model.
    fn dispose(&mut self) -> Result<(), ReleaseError> {
        Ok(())
    }

    /// Stop a subscription-like value.
    fn unsubscribe(&mut self) -> Result<(), ReleaseError> {
        Ok(())
    }

    /// Label used in logs and release errors.
    fn label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T: Owned + ?Sized> Owned for Box<T> {
    fn shape(&self) -> OwnedShape {
        (**self).shape()
    }

    fn dispose(&mut self) -> Result<(), ReleaseError> {
        (**self).dispose()
    }

    fn unsubscribe(&mut self) -> Result<(), ReleaseError> {
        (**self).unsubscribe()
    }

    fn label(&self) -> &'static str {
        (**self).label()
    }
}

/// Shared handles release the value they point at, so a store can keep using
/// a child it registered.
impl<T: Owned> Owned for Rc<RefCell<T>> {
    fn shape(&self) -> OwnedShape {
        self.borrow().shape()
    }

    fn dispose(&mut self) -> Result<(), ReleaseError> {
        self.borrow_mut().dispose()
    }

    fn unsubscribe(&mut self) -> Result<(), ReleaseError> {
        self.borrow_mut().unsubscribe()
    }

    fn label(&self) -> &'static str {
        self.borrow().label()
    }
}

/// Ordered list of owned entries.
#[derive(Default)]
pub struct OwnedRegistry {
    entries: Vec<Box<dyn Owned>>,
    released: bool,
}

impl OwnedRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take responsibility for releasing `resource`.
    ///
    /// Values with an empty shape are dropped without any call. After
    /// [`release_all`](Self::release_all) the resource is released on the
    /// spot and any failure is returned.
    pub fn register(&mut self, resource: impl Owned + 'static) -> Result<(), ReleaseError> {
        let mut resource: Box<dyn Owned> = Box::new(resource);
        if resource.shape().is_empty() {
            trace!(resource = resource.label(), "owned value has no release shape");
            return Ok(());
        }
        if self.released {
            warn!(
                resource = resource.label(),
                "owned value registered after release; releasing immediately"
            );
            let mut failures = Vec::new();
            release_one(resource.as_mut(), &mut failures);
            return failures.into_iter().next().map_or(Ok(()), Err);
        }
        self.entries.push(resource);
        Ok(())
    }

    /// Release every entry in registration order, returning the failures.
    pub fn release_all(&mut self) -> Vec<ReleaseError> {
        self.released = true;
        let mut failures = Vec::new();
        for mut entry in std::mem::take(&mut self.entries) {
            release_one(entry.as_mut(), &mut failures);
        }
        failures
    }

    /// Number of entries awaiting release.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether [`release_all`](Self::release_all) has run.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

fn release_one(entry: &mut dyn Owned, failures: &mut Vec<ReleaseError>) {
    let shape = entry.shape();
    let label = entry.label();
    if shape.contains(OwnedShape::MODEL) {
        trace!(resource = label, "disposing owned model");
        if let Err(err) = entry.dispose() {
            warn!(resource = label, error = %err, "owned model failed to dispose");
            failures.push(err);
        }
    }
    if shape.contains(OwnedShape::SUBSCRIPTION) {
        trace!(resource = label, "unsubscribing owned subscription");
        if let Err(err) = entry.unsubscribe() {
            warn!(resource = label, error = %err, "owned subscription failed to unsubscribe");
            failures.push(err);
        }
    }
}

impl fmt::Debug for OwnedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedRegistry")
            .field(
                "entries",
                &self.entries.iter().map(|e| e.label()).collect::<Vec<_>>(),
            )
            .field("released", &self.released)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
