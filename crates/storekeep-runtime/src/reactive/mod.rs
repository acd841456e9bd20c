#![forbid(unsafe_code)]

//! Reactive values for stores.
//!
//! - [`Observable`]: shared value that notifies subscribers when it changes.
//! - [`Subscription`]: keeps one subscriber alive; dropping it detaches.
//! - [`Computed`]: memoized function of observables.
//!
//! Stores attach to these through
//! [`Reactivity`](crate::capabilities::Reactivity), which ties each
//! subscription to the store's lifetime.
//!
//! # Invariants
//!
//! 1. An observable's version moves only when `set` stores a different value.
//! 2. Subscribers run in subscription order, after the value is stored.
//! 3. A detached subscriber never runs again.

pub mod computed;
pub mod observable;

pub use computed::Computed;
pub use observable::{Observable, Subscription};
