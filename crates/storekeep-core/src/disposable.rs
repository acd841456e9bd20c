#![forbid(unsafe_code)]

//! One-shot release handles and resource groups.
//!
//! - [`Disposable`]: wraps a release action that runs at most once.
//! - [`CompositeDisposable`]: a shared group of disposables released together.
//!
//! # Invariants
//!
//! 1. A `Disposable` runs its action at most once, no matter how many times
//!    `dispose()` is called.
//! 2. `CompositeDisposable::dispose()` releases members in registration order
//!    and is idempotent; members are never released twice.
//! 3. Adding to a group that was already released releases the new member
//!    immediately instead of retaining it.
//! 4. Releasing an empty group is a no-op.
//!
//! # Failure Modes
//!
//! - **Panicking release action**: the panic propagates to the caller of
//!   `dispose()`. Members registered after the panicking one are dropped
//!   without running; the group is still marked released.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

// ─── Disposable ──────────────────────────────────────────────────────────────

/// A release action that runs at most once.
///
/// Dropping a `Disposable` without calling [`dispose`](Self::dispose) does
/// **not** run the action; release is always explicit.
pub struct Disposable {
    action: Option<Box<dyn FnOnce()>>,
}

impl Disposable {
    /// Wrap a release action.
    #[must_use]
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// A disposable with nothing to release.
    #[must_use]
    pub fn empty() -> Self {
        Self { action: None }
    }

    /// Run the release action if it has not run yet.
    pub fn dispose(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }

    /// Whether the action has already run (or there never was one).
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.action.is_none()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Default for Disposable {
    fn default() -> Self {
        Self::empty()
    }
}

// ─── CompositeDisposable ─────────────────────────────────────────────────────

#[derive(Default)]
struct CompositeInner {
    members: Vec<Disposable>,
    disposed: bool,
}

/// A group of [`Disposable`]s released by a single call.
///
/// Cloning a `CompositeDisposable` creates a new handle to the **same** group.
#[derive(Clone, Default)]
pub struct CompositeDisposable {
    inner: Rc<RefCell<CompositeInner>>,
}

impl CompositeDisposable {
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a disposable with the group.
    ///
    /// If the group was already released, `disposable` is released right
    /// away.
    pub fn add(&self, mut disposable: Disposable) {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            drop(inner);
            warn!("disposable added to a released group; releasing immediately");
            disposable.dispose();
            return;
        }
        inner.members.push(disposable);
    }

    /// Register a release closure with the group.
    pub fn add_fn(&self, action: impl FnOnce() + 'static) {
        self.add(Disposable::new(action));
    }

    /// Release every member in registration order.
    ///
    /// Subsequent calls do nothing.
    pub fn dispose(&self) {
        let members = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            std::mem::take(&mut inner.members)
        };
        trace!(count = members.len(), "releasing composite disposable");
        // The borrow is released so release actions may touch this group.
        for mut member in members {
            member.dispose();
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Number of members awaiting release.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().members.len()
    }

    /// Whether the group holds no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A disposable that releases this whole group.
    ///
    /// Used to nest one group inside another.
    #[must_use]
    pub fn as_disposable(&self) -> Disposable {
        let group = self.clone();
        Disposable::new(move || group.dispose())
    }

    /// Whether two handles refer to the same group.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CompositeDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CompositeDisposable")
            .field("members", &inner.members.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> Disposable) {
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let make = move || {
            let c = Rc::clone(&c);
            Disposable::new(move || c.set(c.get() + 1))
        };
        (count, make)
    }

    #[test]
    fn disposable_runs_once() {
        let (count, make) = counter();
        let mut d = make();
        assert!(!d.is_disposed());
        d.dispose();
        d.dispose();
        assert_eq!(count.get(), 1);
        assert!(d.is_disposed());
    }

    #[test]
    fn dropping_disposable_does_not_release() {
        let (count, make) = counter();
        drop(make());
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn empty_group_dispose_is_noop() {
        let group = CompositeDisposable::new();
        group.dispose();
        assert!(group.is_disposed());
        assert!(group.is_empty());
    }

    #[test]
    fn group_releases_each_member_once() {
        let (count, make) = counter();
        let group = CompositeDisposable::new();
        group.add(make());
        group.add(make());
        group.add(make());
        assert_eq!(group.len(), 3);

        group.dispose();
        assert_eq!(count.get(), 3);

        group.dispose();
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn group_releases_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let group = CompositeDisposable::new();
        for i in 0..4 {
            let order = Rc::clone(&order);
            group.add_fn(move || order.borrow_mut().push(i));
        }
        group.dispose();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn add_after_dispose_releases_immediately() {
        let (count, make) = counter();
        let group = CompositeDisposable::new();
        group.dispose();
        group.add(make());
        assert_eq!(count.get(), 1);
        assert!(group.is_empty());
    }

    #[test]
    fn clones_share_the_group() {
        let (count, make) = counter();
        let a = CompositeDisposable::new();
        let b = a.clone();
        b.add(make());
        assert!(a.ptr_eq(&b));
        a.dispose();
        assert!(b.is_disposed());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn nested_group_released_with_parent() {
        let (count, make) = counter();
        let parent = CompositeDisposable::new();
        let child = CompositeDisposable::new();
        child.add(make());
        parent.add(child.as_disposable());

        parent.dispose();
        assert!(child.is_disposed());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn release_action_may_add_to_its_own_group() {
        let (count, make) = counter();
        let group = CompositeDisposable::new();
        let g = group.clone();
        let late = RefCell::new(Some(make()));
        group.add_fn(move || {
            if let Some(d) = late.borrow_mut().take() {
                g.add(d);
            }
        });
        group.dispose();
        assert_eq!(count.get(), 1);
    }
}
