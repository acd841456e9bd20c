#![forbid(unsafe_code)]

//! Runtime: the managed store factory, its helper capabilities, and the
//! reactive primitives stores observe.

pub mod capabilities;
pub mod events;
pub mod managed;
pub mod reactive;
pub mod refs;
pub mod timers;

pub use capabilities::{
    Disposables, EventRegistry, Reactivity, RefRegistry, ResourceHost, Resources, Timers,
};
pub use events::EventHub;
pub use managed::{ConstructError, Factory, Managed, ManagedConfig, ManagedType, Scope, Store, wrap};
pub use reactive::{Computed, Observable, Subscription};
pub use refs::{Ref, RefTable};
pub use timers::{Scheduler, TimerHandle, TimerId};
