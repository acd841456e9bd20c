#![forbid(unsafe_code)]

//! Managed store factory.
//!
//! A plain store type implements [`Store`]. The factory turns it into a
//! [`ManagedType`], whose instances ([`Managed`]) own a [`Resources`] bundle,
//! share an [`AppContext`], optionally report to a [`LifecycleObserver`], and
//! release everything they acquired through one [`dispose`](Managed::dispose)
//! call.
//!
//! ```
//! use std::convert::Infallible;
//! use storekeep_runtime::managed::{Scope, Store, wrap};
//!
//! struct Counter {
//!     n: u32,
//! }
//!
//! impl Counter {
//!     fn inc(&mut self) {
//!         self.n += 1;
//!     }
//! }
//!
//! impl Store for Counter {
//!     type Args = ();
//!     type Error = Infallible;
//!
//!     fn construct(_: (), _: &mut Scope<'_>) -> Result<Self, Infallible> {
//!         Ok(Self { n: 0 })
//!     }
//! }
//!
//! let counters = wrap::<Counter>("Counter").unwrap();
//! let mut c = counters.create(()).unwrap();
//! c.inc();
//! assert_eq!(c.n, 1);
//! c.dispose().unwrap();
//! ```
//!
//! # Disposal order
//!
//! 1. The composite group (timers, handlers, reactions, nested groups).
//! 2. Owned entries in registration order: models are disposed, then
//!    subscription-like values are unsubscribed. A failure is recorded and
//!    the scan continues.
//! 3. The store's own [`Store::on_dispose`] hook.
//! 4. The `unmount` notification, if an observer is active.
//!
//! A second `dispose()` is a no-op. Dropping an undisposed instance runs the
//! same sequence.
//!
//! # Construction failure
//!
//! Anything registered before [`Store::construct`] fails is handed back in
//! [`ConstructError`]; dropping the error releases it.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use storekeep_core::capability::Capabilities;
use storekeep_core::context::AppContext;
use storekeep_core::disposable::CompositeDisposable;
use storekeep_core::error::{DisposeError, FactoryError, ReleaseError};
use storekeep_core::lifecycle::{
    self, LifecycleEvent, LifecycleKind, LifecycleObserver, MountId,
};
use storekeep_core::owned::{Owned, OwnedShape};
use tracing::{debug, debug_span, trace, warn};

use crate::capabilities::{ResourceHost, Resources};
use crate::timers::Scheduler;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A plain store definition the factory can manage.
pub trait Store: Sized + 'static {
    /// Construction arguments.
    type Args;
    /// Construction failure.
    type Error: std::error::Error + 'static;

    /// Helpers this store relies on. The factory refuses to build a managed
    /// type when one of them lacks its collaborator.
    const CAPABILITIES: Capabilities = Capabilities::empty();

    /// Build the store. `scope` is live, so resources can be acquired here.
    fn construct(args: Self::Args, scope: &mut Scope<'_>) -> Result<Self, Self::Error>;

    /// Teardown hook, run after every resource has been released.
    fn on_dispose(&mut self) {}
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Behavior switches for managed instances.
#[derive(Debug, Clone, Copy)]
pub struct ManagedConfig {
    /// Report mount/unmount to the observer, if one is configured.
    pub emit_lifecycle: bool,
    /// Log a warning when an instance is dropped without `dispose()`.
    pub warn_on_implicit_dispose: bool,
}

impl Default for ManagedConfig {
    fn default() -> Self {
        Self {
            emit_lifecycle: true,
            warn_on_implicit_dispose: false,
        }
    }
}

impl ManagedConfig {
    #[must_use]
    pub fn with_lifecycle(mut self, emit: bool) -> Self {
        self.emit_lifecycle = emit;
        self
    }

    #[must_use]
    pub fn with_implicit_dispose_warning(mut self, warn: bool) -> Self {
        self.warn_on_implicit_dispose = warn;
        self
    }
}

// ─── Factory ─────────────────────────────────────────────────────────────────

enum ObserverSlot {
    None,
    Explicit(Rc<dyn LifecycleObserver>),
    /// The per-thread emitter, only once tooling has created it.
    ThreadDefault,
}

/// State shared by a managed type and all of its instances.
struct TypeShared {
    tag: Rc<str>,
    observer: ObserverSlot,
    context: AppContext,
    scheduler: Option<Scheduler>,
    config: ManagedConfig,
}

impl TypeShared {
    fn active_observer(&self) -> Option<Rc<dyn LifecycleObserver>> {
        if !self.config.emit_lifecycle {
            return None;
        }
        match &self.observer {
            ObserverSlot::None => None,
            ObserverSlot::Explicit(observer) => Some(Rc::clone(observer)),
            ObserverSlot::ThreadDefault => lifecycle::active_emitter()
                .map(|emitter| Rc::new(emitter) as Rc<dyn LifecycleObserver>),
        }
    }
}

/// Builder for managed types.
pub struct Factory {
    tag: Rc<str>,
    observer: ObserverSlot,
    context: Option<AppContext>,
    scheduler: Option<Scheduler>,
    config: ManagedConfig,
}

impl Factory {
    /// Start a factory. `tag` identifies the type in logs and lifecycle
    /// events; it does not need to be unique.
    #[must_use]
    pub fn new(tag: impl Into<Rc<str>>) -> Self {
        Self {
            tag: tag.into(),
            observer: ObserverSlot::None,
            context: None,
            scheduler: None,
            config: ManagedConfig::default(),
        }
    }

    /// Report every mount and unmount to `observer`.
    #[must_use]
    pub fn observer(mut self, observer: impl LifecycleObserver + 'static) -> Self {
        self.observer = ObserverSlot::Explicit(Rc::new(observer));
        self
    }

    /// Report to the per-thread emitter whenever it exists.
    #[must_use]
    pub fn observe_default_emitter(mut self) -> Self {
        self.observer = ObserverSlot::ThreadDefault;
        self
    }

    /// Share `context` with every instance. Without this, instances of the
    /// built type share a fresh, empty context.
    #[must_use]
    pub fn context(mut self, context: AppContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Back the timer helpers with `scheduler`.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ManagedConfig) -> Self {
        self.config = config;
        self
    }

    /// Produce the managed type for `B`.
    ///
    /// # Errors
    ///
    /// [`FactoryError::MissingCapability`] if `B` declares a capability
    /// whose collaborator was not supplied.
    pub fn build<B: Store>(self) -> Result<ManagedType<B>, FactoryError> {
        let needed = B::CAPABILITIES & Capabilities::NEEDS_COLLABORATOR;
        if needed.contains(Capabilities::TIMERS) && self.scheduler.is_none() {
            return Err(FactoryError::MissingCapability {
                tag: self.tag.to_string(),
                capability: Capabilities::TIMERS.label(),
            });
        }
        debug!(tag = %self.tag, base = type_name::<B>(), "managed type built");
        Ok(ManagedType {
            shared: Rc::new(TypeShared {
                tag: self.tag,
                observer: self.observer,
                context: self.context.unwrap_or_default(),
                scheduler: self.scheduler,
                config: self.config,
            }),
            _base: PhantomData,
        })
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("tag", &self.tag)
            .field("scheduler", &self.scheduler.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Build a managed type for `B` with default collaborators.
///
/// # Errors
///
/// Fails if `B` needs a collaborator; use [`Factory`] to supply it.
pub fn wrap<B: Store>(tag: &str) -> Result<ManagedType<B>, FactoryError> {
    Factory::new(tag).build::<B>()
}

// ─── ManagedType ─────────────────────────────────────────────────────────────

/// The managed counterpart of a store type.
///
/// Cloning a `ManagedType` shares its collaborators.
pub struct ManagedType<B> {
    shared: Rc<TypeShared>,
    _base: PhantomData<fn() -> B>,
}

impl<B> Clone for ManagedType<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            _base: PhantomData,
        }
    }
}

impl<B: Store> ManagedType<B> {
    /// Construct an instance.
    ///
    /// # Errors
    ///
    /// Whatever [`Store::construct`] returns, wrapped with the resources
    /// acquired before the failure.
    pub fn create(&self, args: B::Args) -> Result<Managed<B>, ConstructError<B::Error>> {
        let shared = Rc::clone(&self.shared);
        let _span = debug_span!("managed.construct", tag = %shared.tag).entered();

        let mut resources = Resources::new();
        let built = {
            let mut scope = Scope {
                resources: &mut resources,
                shared: &shared,
            };
            B::construct(args, &mut scope)
        };
        let base = match built {
            Ok(base) => base,
            Err(source) => {
                warn!(tag = %shared.tag, error = %source, "construction failed");
                return Err(ConstructError {
                    tag: Rc::clone(&shared.tag),
                    source,
                    partial: resources,
                });
            }
        };

        let mut managed = Managed {
            base,
            resources,
            shared,
            mount_id: None,
            disposed: false,
        };
        if let Some(observer) = managed.shared.active_observer() {
            let id = MountId::next();
            managed.mount_id = Some(id);
            debug!(tag = %managed.shared.tag, mount_id = id.raw(), "mount");
            observer.on_mount(&managed.event(LifecycleKind::Mount, id));
        }
        Ok(managed)
    }

    /// The identifier given to the factory.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.shared.tag
    }

    /// Short name of the store type, for display.
    #[must_use]
    pub fn name(&self) -> &'static str {
        short_type_name::<B>()
    }

    /// Full path of the store type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        type_name::<B>()
    }

    #[must_use]
    pub fn base_type_id(&self) -> TypeId {
        TypeId::of::<B>()
    }

    /// The context shared by this type's instances.
    #[must_use]
    pub fn context(&self) -> &AppContext {
        &self.shared.context
    }
}

impl<B> fmt::Debug for ManagedType<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedType")
            .field("tag", &self.shared.tag)
            .field("base", &type_name::<B>())
            .finish()
    }
}

/// `type_name` without the module path or generic arguments.
fn short_type_name<B>() -> &'static str {
    let full = type_name::<B>();
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// Construction-time view of a managed instance.
///
/// Implements every capability trait, so [`Store::construct`] can acquire
/// resources before the store value exists.
pub struct Scope<'a> {
    resources: &'a mut Resources,
    shared: &'a TypeShared,
}

impl Scope<'_> {
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.shared.tag
    }

    /// The shared application value, if set and of type `A`.
    #[must_use]
    pub fn app<A: Any>(&self) -> Option<Rc<A>> {
        self.shared.context.get()
    }

    pub fn set_app<A: Any>(&self, app: A) {
        self.shared.context.set(app);
    }

    #[must_use]
    pub fn context(&self) -> &AppContext {
        &self.shared.context
    }

    /// The composite group of the instance under construction.
    #[must_use]
    pub fn subscriptions(&self) -> &CompositeDisposable {
        self.resources.subscriptions()
    }
}

impl ResourceHost for Scope<'_> {
    fn resources(&mut self) -> &mut Resources {
        self.resources
    }

    fn scheduler(&self) -> Option<&Scheduler> {
        self.shared.scheduler.as_ref()
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("tag", &self.shared.tag)
            .field("resources", &self.resources)
            .finish()
    }
}

// ─── Managed ─────────────────────────────────────────────────────────────────

/// A store instance with managed resources.
///
/// Derefs to the store, so its fields and methods are used directly.
/// Capability methods on `Managed` take precedence over store methods of the
/// same name.
pub struct Managed<B: Store> {
    base: B,
    resources: Resources,
    shared: Rc<TypeShared>,
    mount_id: Option<MountId>,
    disposed: bool,
}

impl<B: Store> Managed<B> {
    /// Release everything this instance acquired, run the store's teardown
    /// hook, and notify the observer. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// [`DisposeError::Release`] listing owned entries that failed. The whole
    /// sequence still ran.
    pub fn dispose(&mut self) -> Result<(), DisposeError> {
        if self.disposed {
            trace!(tag = %self.shared.tag, "already disposed");
            return Ok(());
        }
        self.disposed = true;
        let _span = debug_span!(
            "managed.dispose",
            tag = %self.shared.tag,
            mount_id = self.mount_id.map(MountId::raw)
        )
        .entered();

        let failures = self.resources.release();
        self.base.on_dispose();

        if let Some(observer) = self.shared.active_observer() {
            let id = *self.mount_id.get_or_insert_with(MountId::next);
            debug!(tag = %self.shared.tag, mount_id = id.raw(), "unmount");
            observer.on_unmount(&self.event(LifecycleKind::Unmount, id));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            warn!(
                tag = %self.shared.tag,
                failures = failures.len(),
                "dispose finished with release failures"
            );
            Err(DisposeError::Release {
                tag: self.shared.tag.to_string(),
                failures,
            })
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// The identifier given to the factory.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.shared.tag
    }

    /// Assigned when the instance mounted under an active observer.
    #[must_use]
    pub fn mount_id(&self) -> Option<MountId> {
        self.mount_id
    }

    /// The shared application value, if set and of type `A`.
    #[must_use]
    pub fn app<A: Any>(&self) -> Option<Rc<A>> {
        self.shared.context.get()
    }

    /// Replace the shared application value for every instance sharing this
    /// context.
    pub fn set_app<A: Any>(&self, app: A) {
        self.shared.context.set(app);
    }

    #[must_use]
    pub fn context(&self) -> &AppContext {
        &self.shared.context
    }

    /// The instance's composite group.
    #[must_use]
    pub fn subscriptions(&self) -> &CompositeDisposable {
        self.resources.subscriptions()
    }

    /// Number of owned entries awaiting release.
    #[must_use]
    pub fn owned_len(&self) -> usize {
        self.resources.owned_len()
    }

    #[must_use]
    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut B {
        &mut self.base
    }

    /// Whether the store type is `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        TypeId::of::<T>() == TypeId::of::<B>()
    }

    fn event(&self, kind: LifecycleKind, mount_id: MountId) -> LifecycleEvent<'_> {
        LifecycleEvent {
            kind,
            tag: &self.shared.tag,
            mount_id,
            instance: self,
        }
    }
}

impl<B: Store> Deref for Managed<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.base
    }
}

impl<B: Store> DerefMut for Managed<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.base
    }
}

impl<B: Store> ResourceHost for Managed<B> {
    fn resources(&mut self) -> &mut Resources {
        &mut self.resources
    }

    fn scheduler(&self) -> Option<&Scheduler> {
        self.shared.scheduler.as_ref()
    }
}

/// A managed instance is a model: registering it with another store cascades
/// that store's disposal into it.
impl<B: Store> Owned for Managed<B> {
    fn shape(&self) -> OwnedShape {
        OwnedShape::MODEL
    }

    fn dispose(&mut self) -> Result<(), ReleaseError> {
        Managed::dispose(self)
            .map_err(|err| ReleaseError::new(self.shared.tag.to_string(), err.to_string()))
    }

    fn label(&self) -> &'static str {
        short_type_name::<B>()
    }
}

impl<B: Store> Drop for Managed<B> {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if self.shared.config.warn_on_implicit_dispose {
            warn!(tag = %self.shared.tag, "instance dropped without dispose()");
        }
        if let Err(err) = self.dispose() {
            warn!(tag = %self.shared.tag, error = %err, "dispose during drop failed");
        }
    }
}

impl<B: Store + fmt::Debug> fmt::Debug for Managed<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("tag", &self.shared.tag)
            .field("mount_id", &self.mount_id)
            .field("disposed", &self.disposed)
            .field("base", &self.base)
            .finish()
    }
}

// ─── ConstructError ──────────────────────────────────────────────────────────

/// [`Store::construct`] failed.
///
/// Carries the resources acquired before the failure. Dropping the error
/// releases them; [`into_parts`](Self::into_parts) hands them over instead.
pub struct ConstructError<E> {
    tag: Rc<str>,
    source: E,
    partial: Resources,
}

impl<E> ConstructError<E> {
    /// The store's own error.
    #[must_use]
    pub fn error(&self) -> &E {
        &self.source
    }

    /// Resources acquired before the failure.
    #[must_use]
    pub fn partial(&self) -> &Resources {
        &self.partial
    }

    pub fn partial_mut(&mut self) -> &mut Resources {
        &mut self.partial
    }

    #[must_use]
    pub fn into_parts(self) -> (E, Resources) {
        (self.source, self.partial)
    }
}

impl<E: fmt::Debug> fmt::Debug for ConstructError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructError")
            .field("tag", &self.tag)
            .field("source", &self.source)
            .field("partial", &self.partial)
            .finish()
    }
}

impl<E: fmt::Display> fmt::Display for ConstructError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: construction failed: {}", self.tag, self.source)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ConstructError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
