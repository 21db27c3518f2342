//! Definitions: construction recipes the container resolves from.
//!
//! A [`Definition`] describes one concrete type (plus an optional
//! qualifier), how to build it, how to finish wiring it after
//! construction, and which interfaces it may be handed out as.
//!
//! Rust has no runtime subtyping, so every interface a bean is assignable
//! to is declared as a *view*: an upcast `Arc<C> -> Arc<dyn I>`. Views of
//! interfaces that have a proxy wrapper are declared with
//! [`DefinitionBuilder::intercept`] and may be proxied.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use warden_container::definition::Definition;
//! use warden_container::injection::Constructor;
//! use warden_container::key::Dependency;
//!
//! trait Logger: Send + Sync {}
//!
//! #[derive(Default)]
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {}
//!
//! struct Service {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! let logger = Definition::of::<ConsoleLogger>()
//!     .default_constructor()
//!     .expose::<dyn Logger>(|l| l)
//!     .build();
//!
//! let service = Definition::of::<Service>()
//!     .constructor(Constructor::inject(vec![Dependency::of::<dyn Logger>()], |args| {
//!         Ok(Service { logger: args.next::<dyn Logger>()? })
//!     }))
//!     .build();
//!
//! assert_eq!(logger.id().to_string(), "ConsoleLogger");
//! assert_eq!(service.id().to_string(), "Service");
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::ResolveContext;
use crate::decision::ProxyDecider;
use crate::descriptor::{Marker, ReceiverInfo, TypeDescriptor};
use crate::error::Result;
use crate::injection::{AnyHandle, Constructor, ErasedConstructor, downcast, erase};
use crate::key::{DefinitionId, TypeKey};
use crate::proxy::{Interceptable, ProxyCore};

pub(crate) type FactoryFn =
    Arc<dyn Fn(&mut ResolveContext<'_>) -> Result<AnyHandle> + Send + Sync>;
pub(crate) type InjectorFn =
    Arc<dyn Fn(&AnyHandle, &mut ResolveContext<'_>) -> Result<()> + Send + Sync>;
type CastFn = Arc<dyn Fn(&AnyHandle) -> Option<AnyHandle> + Send + Sync>;
type WrapFn = Arc<dyn Fn(&AnyHandle, ProxyCore) -> Option<(AnyHandle, usize)> + Send + Sync>;
type ReloadFn = Arc<dyn Fn(&AnyHandle) + Send + Sync>;

/// An interface a definition can be handed out as.
#[derive(Clone)]
pub(crate) struct View {
    pub(crate) key: TypeKey,
    cast: CastFn,
    pub(crate) proxy: Option<ProxySpec>,
}

impl View {
    pub(crate) fn cast(&self, raw: &AnyHandle) -> Option<AnyHandle> {
        (self.cast)(raw)
    }
}

/// How to wrap an interceptable view.
#[derive(Clone)]
pub(crate) struct ProxySpec {
    pub(crate) descriptor: &'static TypeDescriptor,
    wrap: WrapFn,
}

impl ProxySpec {
    /// Wraps the view handle; returns the proxy and its address.
    pub(crate) fn wrap(&self, view: &AnyHandle, core: ProxyCore) -> Option<(AnyHandle, usize)> {
        (self.wrap)(view, core)
    }
}

/// A construction recipe for one concrete type and qualifier.
pub struct Definition {
    id: DefinitionId,
    requested: TypeKey,
    primary: bool,
    eager: bool,
    markers: Vec<Marker>,
    views: Vec<View>,
    instance: Option<AnyHandle>,
    factory: Option<FactoryFn>,
    constructors: Vec<ErasedConstructor>,
    injectors: Vec<InjectorFn>,
    reload: Option<ReloadFn>,
}

impl Definition {
    /// Starts a definition for concrete type `C`.
    pub fn of<C: ?Sized + Send + Sync + 'static>() -> DefinitionBuilder<C> {
        DefinitionBuilder {
            qualifier: None,
            primary: false,
            eager: false,
            markers: Vec::new(),
            views: Vec::new(),
            instance: None,
            factory: None,
            constructors: Vec::new(),
            injectors: Vec::new(),
            reload: None,
            _concrete: PhantomData,
        }
    }

    /// Starts a definition around an already built instance.
    pub fn instance<C: ?Sized + Send + Sync + 'static>(instance: Arc<C>) -> DefinitionBuilder<C> {
        Self::of::<C>().instance(instance)
    }

    #[inline]
    pub fn id(&self) -> &DefinitionId {
        &self.id
    }

    /// The type this definition was registered for: its first exposed
    /// interface, or the concrete type.
    #[inline]
    pub fn requested(&self) -> TypeKey {
        self.requested
    }

    #[inline]
    pub fn concrete(&self) -> TypeKey {
        self.id.concrete()
    }

    #[inline]
    pub fn qualifier(&self) -> Option<&str> {
        self.id.qualifier()
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[inline]
    pub fn is_eager(&self) -> bool {
        self.eager
    }

    /// Class-level markers of the concrete type.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Every interface this definition is exposed as.
    pub fn exposes(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.views.iter().map(|v| v.key)
    }

    /// Descriptors of the interceptable views.
    pub fn interceptable(&self) -> impl Iterator<Item = &'static TypeDescriptor> + '_ {
        self.views.iter().filter_map(|v| v.proxy.as_ref().map(|p| p.descriptor))
    }

    /// `true` if `key` is the concrete type or one of the views.
    pub fn is_assignable_to(&self, key: &TypeKey) -> bool {
        self.concrete() == *key || self.views.iter().any(|v| v.key == *key)
    }

    /// Matching facts for handlers and deciders.
    pub fn receiver_info(&self) -> ReceiverInfo {
        ReceiverInfo {
            identity: self.id.clone(),
            assignable: self.exposes().collect(),
            markers: self.markers.clone(),
        }
    }

    pub(crate) fn views(&self) -> &[View] {
        &self.views
    }

    pub(crate) fn view(&self, key: &TypeKey) -> Option<&View> {
        self.views.iter().find(|v| v.key == *key)
    }

    /// The raw instance as `key`, without any proxying.
    pub(crate) fn cast(&self, raw: &AnyHandle, key: &TypeKey) -> Option<AnyHandle> {
        if self.concrete() == *key {
            return Some(raw.clone());
        }
        self.view(key).and_then(|v| v.cast(raw))
    }

    pub(crate) fn prebuilt(&self) -> Option<&AnyHandle> {
        self.instance.as_ref()
    }

    pub(crate) fn factory(&self) -> Option<&FactoryFn> {
        self.factory.as_ref()
    }

    pub(crate) fn constructors(&self) -> &[ErasedConstructor] {
        &self.constructors
    }

    pub(crate) fn injectors(&self) -> &[InjectorFn] {
        &self.injectors
    }

    /// Runs the reload callback against `raw`. Returns `false` if there is none.
    pub(crate) fn reload(&self, raw: &AnyHandle) -> bool {
        match &self.reload {
            Some(callback) => {
                callback(raw);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("id", &self.id)
            .field("requested", &self.requested)
            .field("primary", &self.primary)
            .field("eager", &self.eager)
            .field("views", &self.views.iter().map(|v| v.key).collect::<Vec<_>>())
            .field("constructors", &self.constructors.len())
            .field("injectors", &self.injectors.len())
            .finish()
    }
}

/// Builder for [`Definition`], typed by the concrete type `C`.
pub struct DefinitionBuilder<C: ?Sized> {
    qualifier: Option<String>,
    primary: bool,
    eager: bool,
    markers: Vec<Marker>,
    views: Vec<View>,
    instance: Option<AnyHandle>,
    factory: Option<FactoryFn>,
    constructors: Vec<ErasedConstructor>,
    injectors: Vec<InjectorFn>,
    reload: Option<ReloadFn>,
    _concrete: PhantomData<fn() -> Arc<C>>,
}

impl<C: ?Sized + Send + Sync + 'static> DefinitionBuilder<C> {
    pub fn qualifier(mut self, qualifier: &str) -> Self {
        self.qualifier = Some(qualifier.to_owned());
        self
    }

    /// Wins ties when several definitions are assignable to a requested type.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Resolve during container startup instead of on first use.
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Adds a class-level marker to the concrete type.
    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Uses an already built instance. It is cached as-is and never proxied.
    pub fn instance(mut self, instance: Arc<C>) -> Self {
        self.instance = Some(erase(instance));
        self
    }

    /// Builds the instance with a factory. Takes precedence over constructors.
    ///
    /// Factories run while the container holds its creation lock. A factory
    /// must not block on work that resolves an uninstantiated bean on
    /// another thread (a worker pool task, for instance): that resolution
    /// waits for the lock and the two deadlock. Resolve through `ctx`
    /// instead.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        C: Sized,
        F: Fn(&mut ResolveContext<'_>) -> Result<C> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move |ctx| factory(ctx).map(|c| erase(Arc::new(c)))));
        self
    }

    /// Adds a constructor candidate.
    pub fn constructor(mut self, constructor: Constructor<C>) -> Self
    where
        C: Sized,
    {
        self.constructors.push(constructor.erase());
        self
    }

    /// Adds `C::default` as the no-argument constructor.
    pub fn default_constructor(self) -> Self
    where
        C: Sized + Default,
    {
        self.constructor(Constructor::no_args(|| Ok(C::default())))
    }

    /// Adds a field/setter injector, run after construction while the
    /// instance is already reachable from the cache.
    pub fn field<F>(mut self, inject: F) -> Self
    where
        F: Fn(&C, &mut ResolveContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.injectors.push(Arc::new(move |handle, ctx| {
            let this = downcast::<C>(handle, &TypeKey::of::<C>())?;
            inject(&this, ctx)
        }));
        self
    }

    /// Exposes the bean as interface `I`.
    pub fn expose<I>(mut self, upcast: impl Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.views.push(View {
            key: TypeKey::of::<I>(),
            cast: cast_with(upcast),
            proxy: None,
        });
        self
    }

    /// Exposes the bean as interceptable interface `I`; this view is the
    /// one handed out as a proxy when the bean is proxied.
    pub fn intercept<I>(mut self, upcast: impl Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static) -> Self
    where
        I: ?Sized + Interceptable,
    {
        let wrap: WrapFn = Arc::new(|view: &AnyHandle, core: ProxyCore| {
            let inner = view.downcast_ref::<Arc<I>>()?.clone();
            let proxy = I::wrap(inner, core);
            let address = Arc::as_ptr(&proxy) as *const () as usize;
            Some((erase(proxy), address))
        });
        self.views.push(View {
            key: TypeKey::of::<I>(),
            cast: cast_with(upcast),
            proxy: Some(ProxySpec {
                descriptor: I::descriptor(),
                wrap,
            }),
        });
        self
    }

    /// Registers the bean as a [`ProxyDecider`]. Deciders are never proxied.
    pub fn as_decider(self) -> Self
    where
        C: ProxyDecider + Sized,
    {
        self.expose::<dyn ProxyDecider>(|d| d)
    }

    /// Callback invoked by [`Container::reload`](crate::container::Container::reload).
    pub fn on_reload(mut self, callback: impl Fn(&C) + Send + Sync + 'static) -> Self {
        self.reload = Some(Arc::new(move |handle| {
            if let Some(this) = handle.downcast_ref::<Arc<C>>() {
                callback(this);
            }
        }));
        self
    }

    pub fn build(self) -> Definition {
        let concrete = TypeKey::of::<C>();
        let requested = self.views.first().map_or(concrete, |v| v.key);
        Definition {
            id: DefinitionId::new(concrete, self.qualifier.as_deref()),
            requested,
            primary: self.primary,
            eager: self.eager,
            markers: self.markers,
            views: self.views,
            instance: self.instance,
            factory: self.factory,
            constructors: self.constructors,
            injectors: self.injectors,
            reload: self.reload,
        }
    }
}

fn cast_with<C, I>(upcast: impl Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static) -> CastFn
where
    C: ?Sized + Send + Sync + 'static,
    I: ?Sized + Send + Sync + 'static,
{
    Arc::new(move |raw: &AnyHandle| {
        raw.downcast_ref::<Arc<C>>()
            .map(|concrete| erase(upcast(concrete.clone())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Payment: Send + Sync {
        fn pay(&self) -> u32;
    }

    #[derive(Default)]
    struct CardPayment;
    impl Payment for CardPayment {
        fn pay(&self) -> u32 {
            10
        }
    }

    const SECURED: Marker = Marker::new("secured");

    #[test]
    fn identity_and_flags() {
        let def = Definition::of::<CardPayment>()
            .qualifier("card")
            .primary()
            .eager()
            .marker(SECURED)
            .default_constructor()
            .build();

        assert_eq!(def.id().to_string(), "CardPayment@card");
        assert_eq!(def.qualifier(), Some("card"));
        assert!(def.is_primary());
        assert!(def.is_eager());
        assert_eq!(def.markers(), &[SECURED]);
        assert_eq!(def.requested(), TypeKey::of::<CardPayment>());
    }

    #[test]
    fn views_make_definition_assignable() {
        let def = Definition::of::<CardPayment>()
            .default_constructor()
            .expose::<dyn Payment>(|p| p)
            .build();

        assert!(def.is_assignable_to(&TypeKey::of::<CardPayment>()));
        assert!(def.is_assignable_to(&TypeKey::of::<dyn Payment>()));
        assert!(!def.is_assignable_to(&TypeKey::of::<String>()));
        assert_eq!(def.requested(), TypeKey::of::<dyn Payment>());
        assert_eq!(def.interceptable().count(), 0);
    }

    #[test]
    fn cast_produces_requested_view() {
        let def = Definition::of::<CardPayment>()
            .expose::<dyn Payment>(|p| p)
            .build();
        let raw = erase(Arc::new(CardPayment));

        let view = def.cast(&raw, &TypeKey::of::<dyn Payment>()).unwrap();
        let payment = downcast::<dyn Payment>(&view, def.id()).unwrap();
        assert_eq!(payment.pay(), 10);

        assert!(def.cast(&raw, &TypeKey::of::<CardPayment>()).is_some());
        assert!(def.cast(&raw, &TypeKey::of::<String>()).is_none());
    }

    #[test]
    fn receiver_info_lists_views_and_markers() {
        let def = Definition::of::<CardPayment>()
            .marker(SECURED)
            .expose::<dyn Payment>(|p| p)
            .build();
        let info = def.receiver_info();
        assert!(info.is_instance_of(&TypeKey::of::<dyn Payment>()));
        assert!(info.has_marker(SECURED));
    }

    #[test]
    fn reload_callback_runs_against_instance() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let def = Definition::of::<CardPayment>()
            .on_reload(move |p| {
                seen.fetch_add(p.pay() as usize, Ordering::SeqCst);
            })
            .build();

        assert!(def.reload(&erase(Arc::new(CardPayment))));
        assert_eq!(calls.load(Ordering::SeqCst), 10);

        let plain = Definition::of::<CardPayment>().build();
        assert!(!plain.reload(&erase(Arc::new(CardPayment))));
    }
}
