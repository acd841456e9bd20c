#![forbid(unsafe_code)]

//! Lifecycle notification for managed instances.
//!
//! Developer tooling can watch instances appear (`mount`) and go away
//! (`unmount`). An observer is injected into the factory; when none is
//! given, nothing is emitted and no mount id is assigned.
//!
//! [`LifecycleEmitter`] is the stock observer: listeners attach per event
//! kind and receive every event emitted after they attach. There is no
//! buffering, so events emitted before a listener exists are dropped.
//!
//! For tooling that cannot be threaded through construction, [`emitter`]
//! returns a lazily created emitter for the current thread.

use std::any::Any;
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::disposable::Disposable;

// ─── Mount ids ───────────────────────────────────────────────────────────────

static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to an instance when it mounts under an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(u64);

impl MountId {
    /// Allocate a fresh id, unique within the process.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    Mount,
    Unmount,
}

impl LifecycleKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Unmount => "unmount",
        }
    }
}

/// A mount or unmount notification.
///
/// `instance` borrows the managed instance itself; listeners can downcast it
/// to the concrete managed type.
#[derive(Clone, Copy)]
pub struct LifecycleEvent<'a> {
    pub kind: LifecycleKind,
    pub tag: &'a str,
    pub mount_id: MountId,
    pub instance: &'a dyn Any,
}

impl<'a> LifecycleEvent<'a> {
    /// The instance as a concrete type, if it is one.
    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<&'a T> {
        self.instance.downcast_ref::<T>()
    }
}

impl fmt::Debug for LifecycleEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEvent")
            .field("kind", &self.kind)
            .field("tag", &self.tag)
            .field("mount_id", &self.mount_id)
            .finish_non_exhaustive()
    }
}

// ─── Observer ────────────────────────────────────────────────────────────────

/// Receives lifecycle notifications from managed instances.
pub trait LifecycleObserver {
    fn on_mount(&self, event: &LifecycleEvent<'_>);
    fn on_unmount(&self, event: &LifecycleEvent<'_>);

    /// Dispatch by kind.
    fn notify(&self, event: &LifecycleEvent<'_>) {
        match event.kind {
            LifecycleKind::Mount => self.on_mount(event),
            LifecycleKind::Unmount => self.on_unmount(event),
        }
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {
    fn on_mount(&self, _event: &LifecycleEvent<'_>) {}
    fn on_unmount(&self, _event: &LifecycleEvent<'_>) {}
}

// ─── Emitter ─────────────────────────────────────────────────────────────────

type Listener = Rc<dyn Fn(&LifecycleEvent<'_>)>;

#[derive(Default)]
struct EmitterInner {
    next_id: u64,
    listeners: Vec<(u64, LifecycleKind, Listener)>,
}

/// Fan-out observer with per-kind listeners.
///
/// Cloning a `LifecycleEmitter` creates a new handle to the **same** listener
/// list.
#[derive(Clone, Default)]
pub struct LifecycleEmitter {
    inner: Rc<RefCell<EmitterInner>>,
}

impl LifecycleEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener for one event kind.
    ///
    /// Disposing the returned handle detaches it.
    pub fn on(
        &self,
        kind: LifecycleKind,
        listener: impl Fn(&LifecycleEvent<'_>) + 'static,
    ) -> Disposable {
        let listener: Listener = Rc::new(listener);
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, kind, listener));
            id
        };
        let weak: Weak<RefCell<EmitterInner>> = Rc::downgrade(&self.inner);
        Disposable::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.retain(|(lid, _, _)| *lid != id);
            }
        })
    }

    pub fn on_mount(&self, listener: impl Fn(&LifecycleEvent<'_>) + 'static) -> Disposable {
        self.on(LifecycleKind::Mount, listener)
    }

    pub fn on_unmount(&self, listener: impl Fn(&LifecycleEvent<'_>) + 'static) -> Disposable {
        self.on(LifecycleKind::Unmount, listener)
    }

    /// Deliver `event` to every listener attached for its kind, in attach
    /// order. Returns how many listeners ran.
    pub fn emit(&self, event: &LifecycleEvent<'_>) -> usize {
        // Snapshot so listeners may attach or detach while being called.
        let listeners: Vec<Listener> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind)
            .map(|(_, _, l)| Rc::clone(l))
            .collect();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Number of listeners attached for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: LifecycleKind) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    /// Whether two handles refer to the same emitter.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl LifecycleObserver for LifecycleEmitter {
    fn on_mount(&self, event: &LifecycleEvent<'_>) {
        self.emit(event);
    }

    fn on_unmount(&self, event: &LifecycleEvent<'_>) {
        self.emit(event);
    }
}

impl fmt::Debug for LifecycleEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEmitter")
            .field("listeners", &self.inner.borrow().listeners.len())
            .finish()
    }
}

// ─── Per-thread emitter ──────────────────────────────────────────────────────

thread_local! {
    static THREAD_EMITTER: OnceCell<LifecycleEmitter> = const { OnceCell::new() };
}

/// The current thread's emitter, created on first access.
#[must_use]
pub fn emitter() -> LifecycleEmitter {
    THREAD_EMITTER.with(|cell| cell.get_or_init(LifecycleEmitter::new).clone())
}

/// The current thread's emitter, only if [`emitter`] has already created it.
#[must_use]
pub fn active_emitter() -> Option<LifecycleEmitter> {
    THREAD_EMITTER.with(|cell| cell.get().cloned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
