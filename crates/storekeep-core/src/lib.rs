#![forbid(unsafe_code)]

//! Core: disposables, owned-resource registry, lifecycle observation, and
//! the shared application context.

pub mod capability;
pub mod context;
pub mod disposable;
pub mod error;
pub mod lifecycle;
pub mod owned;

pub use capability::Capabilities;
pub use context::AppContext;
pub use disposable::{CompositeDisposable, Disposable};
pub use error::{CapabilityError, DisposeError, FactoryError, ReleaseError};
pub use lifecycle::{
    LifecycleEmitter, LifecycleEvent, LifecycleKind, LifecycleObserver, MountId, NoopObserver,
};
pub use owned::{Owned, OwnedRegistry, OwnedShape};
