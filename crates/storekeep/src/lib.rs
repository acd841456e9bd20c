#![forbid(unsafe_code)]

//! storekeep public facade crate.
//!
//! Wrap a plain store type with [`wrap`] or [`Factory`] to get instances that
//! release their timers, handlers, reactions, and child stores on
//! [`Managed::dispose`].

pub use storekeep_core as store_core;
pub use storekeep_runtime as store_runtime;

pub use storekeep_core::{
    AppContext, Capabilities, CapabilityError, CompositeDisposable, Disposable, DisposeError,
    FactoryError, LifecycleEmitter, LifecycleEvent, LifecycleKind, LifecycleObserver, Owned,
    OwnedShape, ReleaseError,
};
pub use storekeep_runtime::{
    ConstructError, Factory, Managed, ManagedConfig, ManagedType, Scope, Store, wrap,
};

pub mod prelude {
    pub use storekeep_core as core;
    pub use storekeep_runtime as runtime;

    pub use storekeep_core::lifecycle::emitter;
    pub use storekeep_core::{
        AppContext, Capabilities, CompositeDisposable, Disposable, LifecycleEmitter,
        LifecycleEvent, LifecycleObserver, Owned, OwnedShape,
    };
    pub use storekeep_runtime::{
        Computed, Disposables, EventHub, EventRegistry, Factory, Managed, ManagedType,
        Observable, Reactivity, Ref, RefRegistry, Scheduler, Scope, Store, Subscription, Timers,
        wrap,
    };
}
