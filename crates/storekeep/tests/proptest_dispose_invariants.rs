//! Property-based invariant tests for managed disposal.
//!
//! For any mix of acquired resources:
//!
//! 1. Nothing a store acquired runs after `dispose()`.
//! 2. Every cleanup action runs exactly once, however often `dispose()` is
//!    called and whether or not the instance is dropped afterwards.
//! 3. Child stores registered as owned are disposed exactly once.
//! 4. Exactly one mount and one unmount are reported per instance.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use proptest::prelude::*;
use storekeep::CapabilityError;
use storekeep::prelude::*;

// ── Plan ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Plan {
    timeouts: usize,
    intervals: usize,
    handlers: usize,
    reactions: usize,
    cleanups: usize,
    children: usize,
}

fn plan_strategy() -> impl Strategy<Value = Plan> {
    (0usize..4, 0usize..4, 0usize..4, 0usize..4, 0usize..6, 0usize..3).prop_map(
        |(timeouts, intervals, handlers, reactions, cleanups, children)| Plan {
            timeouts,
            intervals,
            handlers,
            reactions,
            cleanups,
            children,
        },
    )
}

#[derive(Clone, Default)]
struct Tallies {
    fired: Rc<Cell<usize>>,
    cleaned: Rc<Cell<usize>>,
    children_disposed: Rc<Cell<usize>>,
}

fn bump(cell: &Rc<Cell<usize>>) -> impl Fn() + 'static {
    let cell = Rc::clone(cell);
    move || cell.set(cell.get() + 1)
}

// ── Stores ──────────────────────────────────────────────────────────────

struct Leaf {
    disposed: Rc<Cell<usize>>,
}

impl Store for Leaf {
    type Args = Rc<Cell<usize>>;
    type Error = Infallible;

    fn construct(disposed: Rc<Cell<usize>>, _: &mut Scope<'_>) -> Result<Self, Infallible> {
        Ok(Self { disposed })
    }

    fn on_dispose(&mut self) {
        self.disposed.set(self.disposed.get() + 1);
    }
}

struct Busy;

struct BusyArgs {
    plan: Plan,
    tallies: Tallies,
    hub: EventHub<()>,
    source: Observable<u32>,
    leaves: ManagedType<Leaf>,
}

impl Store for Busy {
    type Args = BusyArgs;
    type Error = CapabilityError;
    const CAPABILITIES: Capabilities = Capabilities::TIMERS
        .union(Capabilities::EVENTS)
        .union(Capabilities::REACTIVITY)
        .union(Capabilities::COMPOSITE);

    fn construct(args: BusyArgs, scope: &mut Scope<'_>) -> Result<Self, Self::Error> {
        let BusyArgs {
            plan,
            tallies,
            hub,
            source,
            leaves,
        } = args;
        for _ in 0..plan.timeouts {
            let fire = bump(&tallies.fired);
            scope.set_timeout(Duration::from_millis(50), fire)?;
        }
        for _ in 0..plan.intervals {
            let fire = bump(&tallies.fired);
            scope.set_interval(Duration::from_millis(20), fire)?;
        }
        for _ in 0..plan.handlers {
            let fire = bump(&tallies.fired);
            scope.add_event(&hub, "ping", move |_| fire());
        }
        for _ in 0..plan.reactions {
            let fire = bump(&tallies.fired);
            scope.react(&source, move |_| fire());
        }
        let group = scope.create_composite_disposable();
        for _ in 0..plan.cleanups {
            group.add_fn(bump(&tallies.cleaned));
        }
        for _ in 0..plan.children {
            let Ok(leaf) = leaves.create(Rc::clone(&tallies.children_disposed)) else {
                continue;
            };
            let _ = scope.register_owned(leaf);
        }
        Ok(Self)
    }
}

// ── Properties ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn disposal_releases_everything_exactly_once(
        plan in plan_strategy(),
        repeats in 1usize..4,
        drop_after in any::<bool>(),
    ) {
        let sched = Scheduler::manual();
        let emitter = LifecycleEmitter::new();
        let mounts = Rc::new(Cell::new(0usize));
        let unmounts = Rc::new(Cell::new(0usize));
        let m = Rc::clone(&mounts);
        let u = Rc::clone(&unmounts);
        let _on_mount = emitter.on_mount(move |event| {
            if event.downcast::<Managed<Busy>>().is_some() {
                m.set(m.get() + 1);
            }
        });
        let _on_unmount = emitter.on_unmount(move |event| {
            if event.downcast::<Managed<Busy>>().is_some() {
                u.set(u.get() + 1);
            }
        });

        let busy = Factory::new("Busy")
            .scheduler(sched.clone())
            .observer(emitter.clone())
            .build::<Busy>()
            .unwrap();
        let leaves = wrap::<Leaf>("Leaf").unwrap();
        let tallies = Tallies::default();
        let hub = EventHub::new();
        let source = Observable::new(0u32);

        let mut instance = busy
            .create(BusyArgs {
                plan: plan.clone(),
                tallies: tallies.clone(),
                hub: hub.clone(),
                source: source.clone(),
                leaves,
            })
            .unwrap();
        prop_assert_eq!(instance.owned_len(), plan.children);
        prop_assert_eq!(sched.pending(), plan.timeouts + plan.intervals);

        for _ in 0..repeats {
            instance.dispose().unwrap();
        }
        if drop_after {
            drop(instance);
        }

        prop_assert_eq!(sched.pending(), 0);
        sched.advance(Duration::from_secs(1));
        hub.emit("ping", &());
        source.set(1);
        prop_assert_eq!(tallies.fired.get(), 0);
        prop_assert_eq!(tallies.cleaned.get(), plan.cleanups);
        prop_assert_eq!(tallies.children_disposed.get(), plan.children);
        prop_assert_eq!(hub.handler_count("ping"), 0);
        prop_assert_eq!(source.subscriber_count(), 0);
        prop_assert_eq!(mounts.get(), 1);
        prop_assert_eq!(unmounts.get(), 1);
    }

    #[test]
    fn drop_alone_releases_everything(plan in plan_strategy()) {
        let sched = Scheduler::manual();
        let busy = Factory::new("Busy")
            .scheduler(sched.clone())
            .build::<Busy>()
            .unwrap();
        let tallies = Tallies::default();
        let hub = EventHub::new();
        let source = Observable::new(0u32);

        drop(
            busy.create(BusyArgs {
                plan: plan.clone(),
                tallies: tallies.clone(),
                hub: hub.clone(),
                source: source.clone(),
                leaves: wrap::<Leaf>("Leaf").unwrap(),
            })
            .unwrap(),
        );

        sched.advance(Duration::from_secs(1));
        hub.emit("ping", &());
        source.set(1);
        prop_assert_eq!(tallies.fired.get(), 0);
        prop_assert_eq!(tallies.cleaned.get(), plan.cleanups);
        prop_assert_eq!(tallies.children_disposed.get(), plan.children);
    }
}
