#![forbid(unsafe_code)]

//! Single-threaded timer scheduling.
//!
//! [`Scheduler`] keeps pending timeouts and intervals ordered by due time.
//! Nothing runs on its own: the host drives the scheduler, either by polling
//! [`run_due`](Scheduler::run_due) against wall-clock time or, for
//! deterministic tests, by advancing a manual clock with
//! [`advance`](Scheduler::advance).
//!
//! # Invariants
//!
//! 1. Timers fire in due-time order; ties fire in scheduling order.
//! 2. A cleared timer never fires again.
//! 3. Intervals are rescheduled from their previous due time, never drift
//!    behind it, and are clamped to [`MIN_INTERVAL`].
//! 4. Callbacks may schedule or clear timers on the same scheduler.
//! 5. Due times saturate at `Duration::MAX`. An interval whose next due time
//!    would not move past that point is dropped after firing.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;
use web_time::{Duration, Instant};

/// Shortest interval period accepted; shorter periods are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Identifier of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// ─── Time source ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum TimeSource {
    /// Elapsed wall-clock time since the scheduler was created.
    Real { epoch: Instant },
    /// Time moved only by `advance`.
    Manual { now: Duration },
}

impl TimeSource {
    fn now(&self) -> Duration {
        match self {
            Self::Real { epoch } => epoch.elapsed(),
            Self::Manual { now } => *now,
        }
    }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

type TimerFn = Rc<RefCell<dyn FnMut()>>;

struct TimerEntry {
    period: Option<Duration>,
    callback: TimerFn,
}

struct SchedulerInner {
    source: TimeSource,
    next_id: u64,
    /// Keyed by (due, id) so iteration order is firing order.
    queue: BTreeMap<(Duration, TimerId), TimerEntry>,
}

impl SchedulerInner {
    fn due_key(&self, id: TimerId) -> Option<(Duration, TimerId)> {
        self.queue.keys().find(|(_, tid)| *tid == id).copied()
    }
}

/// Timer queue shared by every store built from one factory.
///
/// Cloning a `Scheduler` creates a new handle to the **same** queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Scheduler {
    /// A scheduler measuring wall-clock time.
    #[must_use]
    pub fn real() -> Self {
        Self::with_source(TimeSource::Real {
            epoch: Instant::now(),
        })
    }

    /// A scheduler whose clock only moves through [`advance`](Self::advance).
    #[must_use]
    pub fn manual() -> Self {
        Self::with_source(TimeSource::Manual {
            now: Duration::ZERO,
        })
    }

    fn with_source(source: TimeSource) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                source,
                next_id: 1,
                queue: BTreeMap::new(),
            })),
        }
    }

    /// Time elapsed on this scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.borrow().source.now()
    }

    #[must_use]
    pub fn is_manual(&self) -> bool {
        matches!(self.inner.borrow().source, TimeSource::Manual { .. })
    }

    /// Run `callback` once after `delay`.
    pub fn set_timeout(&self, delay: Duration, callback: impl FnMut() + 'static) -> TimerId {
        self.schedule(delay, None, Rc::new(RefCell::new(callback)))
    }

    /// Run `callback` every `period` until cleared.
    pub fn set_interval(&self, period: Duration, callback: impl FnMut() + 'static) -> TimerId {
        let period = period.max(MIN_INTERVAL);
        self.schedule(period, Some(period), Rc::new(RefCell::new(callback)))
    }

    fn schedule(&self, delay: Duration, period: Option<Duration>, callback: TimerFn) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        let due = inner.source.now().saturating_add(delay);
        inner.queue.insert((due, id), TimerEntry { period, callback });
        trace!(timer = id.0, ?due, "timer scheduled");
        id
    }

    /// Cancel a timer. Returns whether it was still pending.
    pub fn clear(&self, id: TimerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        match inner.due_key(id) {
            Some(key) => {
                inner.queue.remove(&key);
                trace!(timer = id.0, "timer cleared");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.inner.borrow().due_key(id).is_some()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Fire every timer due at the current time. Returns how many fired.
    pub fn run_due(&self) -> usize {
        let now = self.now();
        self.fire_until(now)
    }

    /// Move a manual clock forward by `delta`, firing timers as their due
    /// time is reached. On a real clock this is the same as
    /// [`run_due`](Self::run_due).
    pub fn advance(&self, delta: Duration) -> usize {
        let source = self.inner.borrow().source;
        let target = match source {
            TimeSource::Manual { now } => now.saturating_add(delta),
            TimeSource::Real { .. } => return self.run_due(),
        };
        let fired = self.fire_until(target);
        self.set_manual_now(target);
        fired
    }

    fn set_manual_now(&self, at: Duration) {
        if let TimeSource::Manual { now } = &mut self.inner.borrow_mut().source {
            *now = (*now).max(at);
        }
    }

    fn fire_until(&self, target: Duration) -> usize {
        let mut fired = 0;
        loop {
            let (due, id, callback) = {
                let mut inner = self.inner.borrow_mut();
                let Some((&(due, id), _)) = inner.queue.first_key_value() else {
                    break;
                };
                if due > target {
                    break;
                }
                let Some(entry) = inner.queue.remove(&(due, id)) else {
                    break;
                };
                if let Some(period) = entry.period {
                    let next = due.saturating_add(period);
                    if next > due {
                        inner.queue.insert(
                            (next, id),
                            TimerEntry {
                                period: entry.period,
                                callback: Rc::clone(&entry.callback),
                            },
                        );
                    } else {
                        trace!(timer = id.0, "interval reached the end of the clock");
                    }
                }
                (due, id, entry.callback)
            };
            self.set_manual_now(due);
            trace!(timer = id.0, "timer fired");
            (callback.borrow_mut())();
            fired += 1;
        }
        fired
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::real()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("source", &inner.source)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// A scheduled timer together with the scheduler that owns it.
#[derive(Clone, Debug)]
pub struct TimerHandle {
    id: TimerId,
    scheduler: Scheduler,
}

impl TimerHandle {
    pub(crate) fn new(id: TimerId, scheduler: Scheduler) -> Self {
        Self { id, scheduler }
    }

    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancel the timer. Returns whether it was still pending.
    pub fn cancel(&self) -> bool {
        self.scheduler.clear(self.id)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.scheduler.is_pending(self.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
