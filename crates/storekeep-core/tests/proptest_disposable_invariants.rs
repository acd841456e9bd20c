//! Property-based invariant tests for disposables and the owned registry.
//!
//! 1. A composite group runs each member exactly once, in registration order.
//! 2. Disposing a group any number of times runs nothing extra.
//! 3. Members added after disposal run immediately.
//! 4. The registry calls `dispose` only for models and `unsubscribe` only for
//!    subscriptions, once each.
//! 5. A failing entry never prevents later entries from being released.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use storekeep_core::disposable::{CompositeDisposable, Disposable};
use storekeep_core::error::ReleaseError;
use storekeep_core::owned::{Owned, OwnedRegistry, OwnedShape};

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Dispose(usize),
    Unsubscribe(usize),
}

struct Entry {
    index: usize,
    shape: OwnedShape,
    fail: bool,
    calls: Rc<RefCell<Vec<Call>>>,
}

impl Owned for Entry {
    fn shape(&self) -> OwnedShape {
        self.shape
    }

    fn dispose(&mut self) -> Result<(), ReleaseError> {
        self.calls.borrow_mut().push(Call::Dispose(self.index));
        if self.fail {
            return Err(ReleaseError::new("entry", "dispose failed"));
        }
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), ReleaseError> {
        self.calls.borrow_mut().push(Call::Unsubscribe(self.index));
        Ok(())
    }
}

fn shape_strategy() -> impl Strategy<Value = OwnedShape> {
    (0u8..4).prop_map(OwnedShape::from_bits_truncate)
}

// ── Composite ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn composite_runs_members_once_in_order(members in 0usize..32, repeats in 1usize..5) {
        let order = Rc::new(RefCell::new(Vec::new()));
        let group = CompositeDisposable::new();
        for i in 0..members {
            let order = Rc::clone(&order);
            group.add(Disposable::new(move || order.borrow_mut().push(i)));
        }
        prop_assert_eq!(group.len(), members);

        for _ in 0..repeats {
            group.dispose();
        }
        prop_assert!(group.is_disposed());
        prop_assert_eq!(&*order.borrow(), &(0..members).collect::<Vec<_>>());
    }

    #[test]
    fn late_members_run_immediately(before in 0usize..8, after in 1usize..8) {
        let count = Rc::new(RefCell::new(0usize));
        let group = CompositeDisposable::new();
        for _ in 0..before {
            let c = Rc::clone(&count);
            group.add_fn(move || *c.borrow_mut() += 1);
        }
        group.dispose();
        for n in 1..=after {
            let c = Rc::clone(&count);
            group.add_fn(move || *c.borrow_mut() += 1);
            prop_assert_eq!(*count.borrow(), before + n);
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn registry_releases_by_shape(
        entries in proptest::collection::vec((shape_strategy(), any::<bool>()), 0..24)
    ) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = OwnedRegistry::new();
        for (index, &(shape, fail)) in entries.iter().enumerate() {
            registry
                .register(Entry { index, shape, fail, calls: Rc::clone(&calls) })
                .unwrap();
        }
        let tracked = entries.iter().filter(|(shape, _)| !shape.is_empty()).count();
        prop_assert_eq!(registry.len(), tracked);

        let failures = registry.release_all();

        let mut expected = Vec::new();
        let mut expected_failures = 0;
        for (index, &(shape, fail)) in entries.iter().enumerate() {
            if shape.contains(OwnedShape::MODEL) {
                expected.push(Call::Dispose(index));
                if fail {
                    expected_failures += 1;
                }
            }
            if shape.contains(OwnedShape::SUBSCRIPTION) {
                expected.push(Call::Unsubscribe(index));
            }
        }
        prop_assert_eq!(&*calls.borrow(), &expected);
        prop_assert_eq!(failures.len(), expected_failures);

        prop_assert!(registry.release_all().is_empty());
        prop_assert_eq!(calls.borrow().len(), expected.len());
    }
}
