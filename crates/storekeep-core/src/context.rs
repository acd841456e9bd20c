#![forbid(unsafe_code)]

//! Shared application context.
//!
//! Every managed instance built by the same factory holds a handle to one
//! [`AppContext`]. Writing through any handle replaces the value for all of
//! them: last write wins and is visible immediately. Separate factories can
//! be given separate contexts, so tests never share state by accident.
//!
//! The stored value is type-erased; readers name the type they expect.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

#[derive(Default)]
struct ContextInner {
    app: Option<Rc<dyn Any>>,
    version: u64,
}

/// Handle to a shared application slot.
///
/// Cloning an `AppContext` creates a new handle to the **same** slot.
#[derive(Clone, Default)]
pub struct AppContext {
    inner: Rc<RefCell<ContextInner>>,
}

impl AppContext {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot holding `app`.
    #[must_use]
    pub fn with_app<A: Any>(app: A) -> Self {
        let ctx = Self::new();
        ctx.set(app);
        ctx
    }

    /// Replace the shared value for every handle.
    pub fn set<A: Any>(&self, app: A) {
        self.set_shared(Rc::new(app));
    }

    /// Replace the shared value with an already shared one.
    pub fn set_shared(&self, app: Rc<dyn Any>) {
        let mut inner = self.inner.borrow_mut();
        inner.app = Some(app);
        inner.version += 1;
        debug!(version = inner.version, "app context updated");
    }

    /// Empty the slot for every handle.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.app.take().is_some() {
            inner.version += 1;
        }
    }

    /// The current value, if one is set and it is an `A`.
    #[must_use]
    pub fn get<A: Any>(&self) -> Option<Rc<A>> {
        self.get_any().and_then(|app| app.downcast::<A>().ok())
    }

    /// The current value without a type check.
    #[must_use]
    pub fn get_any(&self) -> Option<Rc<dyn Any>> {
        self.inner.borrow().app.clone()
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.borrow().app.is_some()
    }

    /// Number of writes so far. Bumped by `set` and by a `clear` that removed
    /// a value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Whether two handles refer to the same slot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("AppContext")
            .field("set", &inner.app.is_some())
            .field("version", &inner.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct App {
        name: &'static str,
    }

    #[test]
    fn empty_context_reads_none() {
        let ctx = AppContext::new();
        assert!(!ctx.is_set());
        assert!(ctx.get::<App>().is_none());
        assert_eq!(ctx.version(), 0);
    }

    #[test]
    fn write_through_one_handle_is_seen_by_all() {
        let a = AppContext::new();
        let b = a.clone();
        a.set(App { name: "first" });
        assert_eq!(b.get::<App>().unwrap().name, "first");

        b.set(App { name: "second" });
        assert_eq!(a.get::<App>().unwrap().name, "second");
        assert_eq!(a.version(), 2);
    }

    #[test]
    fn wrong_type_reads_none() {
        let ctx = AppContext::with_app(5u32);
        assert!(ctx.get::<App>().is_none());
        assert_eq!(*ctx.get::<u32>().unwrap(), 5);
    }

    #[test]
    fn separate_contexts_are_isolated() {
        let a = AppContext::with_app(App { name: "a" });
        let b = AppContext::new();
        assert!(!a.ptr_eq(&b));
        assert!(b.get::<App>().is_none());
    }

    #[test]
    fn clear_empties_every_handle() {
        let a = AppContext::with_app(1u8);
        let b = a.clone();
        a.clear();
        assert!(!b.is_set());
        assert_eq!(b.version(), 2);
        a.clear();
        assert_eq!(b.version(), 2);
    }
}
