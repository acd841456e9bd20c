#![forbid(unsafe_code)]

//! Named reference slots.
//!
//! A store asks for a slot by name and gets a [`Ref<T>`]; asking again with
//! the same name and type returns a handle to the same slot. Whatever the
//! slots hold is dropped when the owning store is disposed.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

/// A shared, optionally filled slot.
///
/// Cloning a `Ref` creates a new handle to the **same** slot.
pub struct Ref<T> {
    slot: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
        }
    }
}

impl<T> Ref<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the slot, returning the previous value.
    pub fn set(&self, value: T) -> Option<T> {
        self.slot.borrow_mut().replace(value)
    }

    /// Empty the slot, returning the value.
    pub fn take(&self) -> Option<T> {
        self.slot.borrow_mut().take()
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Borrow the value, if any.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.slot.borrow().as_ref())
    }
}

impl<T: Clone> Ref<T> {
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.slot.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&*self.slot.borrow()).finish()
    }
}

// ─── Table ───────────────────────────────────────────────────────────────────

trait ErasedSlot {
    fn clear(&self);
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> ErasedSlot for Ref<T> {
    fn clear(&self) {
        // Drop outside the borrow in case the value's destructor reads the slot.
        let value = self.take();
        drop(value);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Named slots owned by one store.
#[derive(Default)]
pub struct RefTable {
    slots: HashMap<String, Box<dyn ErasedSlot>>,
}

impl RefTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot called `name`, created on first use.
    ///
    /// A name reused with a different type gets a fresh slot that replaces
    /// the old one.
    pub fn slot<T: 'static>(&mut self, name: &str) -> Ref<T> {
        if let Some(existing) = self.slots.get(name) {
            if let Some(slot) = existing.as_any().downcast_ref::<Ref<T>>() {
                return slot.clone();
            }
            warn!(name, "ref slot reused with a different type; replacing");
        }
        let slot = Ref::<T>::new();
        self.slots.insert(name.to_owned(), Box::new(slot.clone()));
        slot
    }

    /// Empty every slot. Handles stay valid but read `None`.
    pub fn clear_all(&mut self) {
        for slot in self.slots.values() {
            slot.clear();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for RefTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefTable")
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_slot() {
        let mut table = RefTable::new();
        let a = table.slot::<String>("input");
        let b = table.slot::<String>("input");
        a.set("hello".into());
        assert_eq!(b.get().as_deref(), Some("hello"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn type_mismatch_replaces_slot() {
        let mut table = RefTable::new();
        let a = table.slot::<u32>("x");
        a.set(1);
        let b = table.slot::<String>("x");
        assert!(!b.is_set());
        assert_eq!(table.len(), 1);
        assert_eq!(a.get(), Some(1));
    }

    #[test]
    fn clear_all_empties_every_handle() {
        let mut table = RefTable::new();
        let a = table.slot::<u8>("a");
        let b = table.slot::<Vec<u8>>("b");
        a.set(1);
        b.set(vec![2]);
        table.clear_all();
        assert!(!a.is_set());
        assert!(b.with(|v| v.is_none()));
    }

    #[test]
    fn set_returns_previous() {
        let r = Ref::new();
        assert_eq!(r.set(1), None);
        assert_eq!(r.set(2), Some(1));
        assert_eq!(r.take(), Some(2));
    }
}
