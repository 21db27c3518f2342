//! # The Container: heart of Warden
//!
//! Owns the definition registry, the resolution engine, the method
//! handler registry and the lifecycle of one application.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──► Container
//!                                 ├── DefinitionRegistry   recipes
//!                                 ├── Engine               singletons, cycles, proxies
//!                                 ├── HandlerRegistry      interceptors
//!                                 └── Lifecycle            phases, hooks
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use warden_container::prelude::*;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str);
//! }
//!
//! #[derive(Default)]
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) { println!("{msg}"); }
//! }
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! let container = Container::builder()
//!     .register(
//!         Definition::of::<ConsoleLogger>()
//!             .default_constructor()
//!             .expose::<dyn Logger>(|l| l)
//!             .build(),
//!     )
//!     .register(
//!         Definition::of::<UserService>()
//!             .factory(|ctx| Ok(UserService { logger: ctx.resolve::<dyn Logger>()? }))
//!             .build(),
//!     )
//!     .build()
//!     .expect("Failed to build container");
//!
//! let service: Arc<UserService> = container.resolve().expect("Failed to resolve");
//! service.logger.log("ready");
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, trace, warn};

use crate::context::ResolveContext;
use crate::decision::{AsyncMethodDecider, HandlerMatchDecider};
use crate::definition::Definition;
use crate::dispatch::Dispatcher;
use crate::engine::Engine;
use crate::error::{BoxError, Result};
use crate::handler::{HandlerRegistry, MethodHandlerRegistration};
use crate::injection::downcast;
use crate::key::TypeKey;
use crate::lifecycle::{
    ContextReadyExtension, DefinitionsReadyExtension, Lifecycle, PreDestroyProcessor,
};
use crate::phase::Phase;
use crate::provider::{PendingRegistrations, Provider, Registrar, submitted_providers};
use crate::registry::DefinitionRegistry;
use crate::settings::ContainerSettings;
#[cfg(feature = "async")]
use crate::{lifecycle::ExecutorShutdown, pool::WorkerPool};

/// Qualifier of the container-owned worker pool bean.
#[cfg(feature = "async")]
pub const ASYNC_POOL: &str = "warden.async";

// ============================================================
// ContainerBuilder
// ============================================================

/// Collects definitions, handlers and extensions, then
/// [`build`](ContainerBuilder::build)s a started [`Container`].
pub struct ContainerBuilder {
    definitions: Vec<Definition>,
    handlers: Vec<MethodHandlerRegistration>,
    definitions_ready: Vec<Box<dyn DefinitionsReadyExtension>>,
    context_ready: Vec<Box<dyn ContextReadyExtension>>,
    pre_destroy: Vec<Box<dyn PreDestroyProcessor>>,
    settings: ContainerSettings,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            definitions: Vec::new(),
            handlers: Vec::new(),
            definitions_ready: Vec::new(),
            context_ready: Vec::new(),
            pre_destroy: Vec::new(),
            settings: ContainerSettings::default(),
        }
    }

    pub fn register(mut self, definition: Definition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn method_handler(mut self, registration: MethodHandlerRegistration) -> Self {
        self.handlers.push(registration);
        self
    }

    /// Add a [`Provider`] module.
    pub fn add_provider(mut self, provider: &dyn Provider) -> Self {
        debug!(provider = provider.name(), "Applying provider");
        provider.register(&mut self);
        self
    }

    /// Add every provider submitted with `inventory::submit!`.
    pub fn with_submitted_providers(mut self) -> Self {
        for entry in submitted_providers() {
            debug!(provider = entry.name, "Applying submitted provider");
            entry.provider.register(&mut self);
        }
        self
    }

    pub fn on_definitions_ready(mut self, extension: impl DefinitionsReadyExtension + 'static) -> Self {
        self.definitions_ready.push(Box::new(extension));
        self
    }

    pub fn on_context_ready(mut self, extension: impl ContextReadyExtension + 'static) -> Self {
        self.context_ready.push(Box::new(extension));
        self
    }

    pub fn pre_destroy(mut self, processor: impl PreDestroyProcessor + 'static) -> Self {
        self.pre_destroy.push(Box::new(processor));
        self
    }

    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds and starts the container.
    ///
    /// Runs the startup phases: definitions-ready extensions, eager
    /// instantiation, context-ready extensions. The first error aborts
    /// startup.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        let ContainerBuilder {
            definitions,
            handlers,
            definitions_ready,
            context_ready,
            pre_destroy,
            settings,
        } = self;
        info!(
            definitions = definitions.len(),
            handlers = handlers.len(),
            "Building container"
        );

        let container = Container::assemble(settings, pre_destroy)?;
        container.handlers.register_all(handlers);
        for definition in definitions {
            container.engine.register(definition)?;
        }

        container.lifecycle.advance(Phase::DefinitionsReady)?;
        for extension in &definitions_ready {
            let mut pending = PendingRegistrations::default();
            extension.on_definitions_ready(&container.registry, &mut pending)?;
            container.apply(pending)?;
        }

        container.lifecycle.advance(Phase::Instantiating)?;
        container.warm_up()?;
        for extension in &context_ready {
            extension.on_context_ready(&container)?;
        }

        container.lifecycle.advance(Phase::Ready)?;
        info!(definitions = container.registry.len(), "Container built successfully ✓");
        Ok(container)
    }
}

impl Registrar for ContainerBuilder {
    fn register_definition(&mut self, definition: Definition) {
        self.definitions.push(definition);
    }

    fn register_method_handler(&mut self, registration: MethodHandlerRegistration) {
        self.handlers.push(registration);
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("definitions", &self.definitions.len())
            .field("handlers", &self.handlers.len())
            .field("settings", &self.settings)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Thread-safe dependency injection container.
///
/// Created by [`ContainerBuilder::build()`].
pub struct Container {
    registry: Arc<DefinitionRegistry>,
    handlers: Arc<HandlerRegistry>,
    engine: Engine,
    lifecycle: Lifecycle,
    pre_destroy: Vec<Box<dyn PreDestroyProcessor>>,
    settings: ContainerSettings,
    #[cfg(feature = "async")]
    pool: Arc<WorkerPool>,
    #[cfg(feature = "async")]
    executor_shutdown: ExecutorShutdown,
}

impl Container {
    /// Create a new builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    fn assemble(settings: ContainerSettings, pre_destroy: Vec<Box<dyn PreDestroyProcessor>>) -> Result<Self> {
        let registry = Arc::new(DefinitionRegistry::new());
        let handlers = Arc::new(HandlerRegistry::new());

        #[cfg(feature = "async")]
        let pool = Arc::new(WorkerPool::new(
            settings.async_workers,
            settings.worker_thread_name.clone(),
        ));
        #[cfg(feature = "async")]
        let dispatcher = Dispatcher::new(handlers.clone(), pool.clone());
        #[cfg(not(feature = "async"))]
        let dispatcher = Dispatcher::new(handlers.clone());

        let container = Container {
            engine: Engine::new(registry.clone(), Arc::new(dispatcher)),
            registry,
            handlers,
            lifecycle: Lifecycle::new(),
            pre_destroy,
            #[cfg(feature = "async")]
            pool,
            #[cfg(feature = "async")]
            executor_shutdown: ExecutorShutdown {
                timeout: settings.shutdown_timeout(),
            },
            settings,
        };
        container.register_builtins()?;
        Ok(container)
    }

    fn register_builtins(&self) -> Result<()> {
        let handlers = self.handlers.clone();
        self.engine.register(
            Definition::of::<HandlerMatchDecider>()
                .factory(move |_| Ok(HandlerMatchDecider::new(handlers.clone())))
                .as_decider()
                .build(),
        )?;
        self.engine.register(
            Definition::of::<AsyncMethodDecider>()
                .default_constructor()
                .as_decider()
                .build(),
        )?;
        #[cfg(feature = "async")]
        self.engine.register(
            Definition::instance(self.pool.clone())
                .qualifier(ASYNC_POOL)
                .build(),
        )?;
        Ok(())
    }

    fn apply(&self, pending: PendingRegistrations) -> Result<()> {
        self.handlers.register_all(pending.handlers);
        for definition in pending.definitions {
            self.engine.register(definition)?;
        }
        Ok(())
    }

    fn warm_up(&self) -> Result<()> {
        let eager_all = self.settings.eager_init;
        let mut count = 0usize;
        for definition in self.registry.all() {
            if eager_all || definition.is_eager() {
                let mut ctx = ResolveContext::new(&self.engine);
                self.engine.instantiate(&definition, &mut ctx)?;
                count += 1;
            }
        }
        debug!(count, eager_all, "Eager instantiation complete");
        Ok(())
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    /// Read access to every definition.
    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    // ── Registration ──

    /// Registers (or replaces) a definition. An identity that is already
    /// instantiated keeps its cached bean.
    pub fn register(&self, definition: Definition) -> Result<()> {
        self.lifecycle.ensure_open("register a definition")?;
        self.engine.register(definition)?;
        Ok(())
    }

    /// Registers an already built instance as a singleton. It is never proxied.
    pub fn register_instance<T: ?Sized + Send + Sync + 'static>(&self, instance: Arc<T>) -> Result<()> {
        self.lifecycle.ensure_open("register an instance")?;
        self.engine.register(Definition::instance(instance).build())?;
        Ok(())
    }

    pub fn register_named_instance<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
        instance: Arc<T>,
    ) -> Result<()> {
        self.lifecycle.ensure_open("register an instance")?;
        self.engine
            .register(Definition::instance(instance).qualifier(qualifier).build())?;
        Ok(())
    }

    /// Registers `C` (built with `Default`) as an implementation of `I`.
    pub fn register_type<I, C>(&self, upcast: impl Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
        C: Default + Send + Sync + 'static,
    {
        self.register(
            Definition::of::<C>()
                .default_constructor()
                .expose::<I>(upcast)
                .build(),
        )
    }

    pub fn register_method_handler(&self, registration: MethodHandlerRegistration) -> Result<()> {
        self.lifecycle.ensure_open("register a method handler")?;
        self.handlers.register(registration);
        Ok(())
    }

    /// Registers handlers in order. Beans already cached keep their
    /// proxy decision.
    pub fn register_all_method_handlers(
        &self,
        registrations: impl IntoIterator<Item = MethodHandlerRegistration>,
    ) -> Result<()> {
        self.lifecycle.ensure_open("register a method handler")?;
        self.handlers.register_all(registrations);
        Ok(())
    }

    /// Runs `hook` during shutdown, after pre-destroy processors.
    /// Hooks run in registration order.
    pub fn register_shutdown_hook(
        &self,
        hook: impl FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    ) -> Result<()> {
        self.lifecycle.add_hook(Box::new(hook))
    }

    // ── Resolution ──

    /// Resolves the single (or primary) bean assignable to `T`.
    ///
    /// ```rust,ignore
    /// let logger: Arc<dyn Logger> = container.resolve()?;
    /// ```
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_qualified::<T>(None)
    }

    /// Resolves the bean assignable to `T` with `qualifier`.
    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, qualifier: &str) -> Result<Arc<T>> {
        self.resolve_qualified::<T>(Some(qualifier))
    }

    fn resolve_qualified<T: ?Sized + Send + Sync + 'static>(&self, qualifier: Option<&str>) -> Result<Arc<T>> {
        self.lifecycle.ensure_resolvable("resolve")?;
        let key = TypeKey::of::<T>();
        trace!(key = %key, ?qualifier, "Resolving");

        let mut ctx = ResolveContext::new(&self.engine);
        let handle = self.engine.resolve_key(key, qualifier, &mut ctx)?;
        downcast::<T>(&handle, &key)
    }

    /// Every definition assignable to `T`, in registration order.
    pub fn definitions<T: ?Sized + 'static>(&self) -> Vec<Arc<Definition>> {
        self.registry.definitions(&TypeKey::of::<T>())
    }

    /// Every already instantiated bean assignable to `T`.
    pub fn beans_of_type<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        let key = TypeKey::of::<T>();
        self.engine
            .beans_of_type(key)
            .iter()
            .filter_map(|handle| downcast::<T>(handle, &key).ok())
            .collect()
    }

    // ── Diagnostics ──

    /// `true` if `handle` is a proxy produced by this container.
    pub fn is_proxy<T: ?Sized>(&self, handle: &Arc<T>) -> bool {
        self.engine.is_proxy(Arc::as_ptr(handle) as *const () as usize)
    }

    /// How many times proxy deciders were bootstrapped (0 or 1).
    pub fn decider_bootstrap_count(&self) -> usize {
        self.engine.decisions().bootstrap_count()
    }

    /// The container-owned pool running asynchronous methods.
    #[cfg(feature = "async")]
    pub fn worker_pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    // ── Lifecycle ──

    /// Invokes the reload callback of every instantiated bean.
    /// Returns how many callbacks ran.
    pub fn reload(&self) -> Result<usize> {
        self.lifecycle.ensure_open("reload")?;
        let reloaded = self.engine.reload();
        info!(reloaded, "Reloaded beans");
        Ok(reloaded)
    }

    /// Shuts the container down: pre-destroy processors, then shutdown
    /// hooks. Failures are logged and do not stop the sequence.
    #[instrument(skip(self), name = "container_shutdown")]
    pub fn shutdown(&self) -> Result<()> {
        self.lifecycle.advance(Phase::ShuttingDown)?;

        for processor in &self.pre_destroy {
            if let Err(err) = processor.pre_destroy(self) {
                warn!(%err, "Pre-destroy processor failed");
            }
        }
        #[cfg(feature = "async")]
        if let Err(err) = self.executor_shutdown.pre_destroy(self) {
            warn!(%err, "Worker pool shutdown failed");
        }

        for (index, hook) in self.lifecycle.take_hooks().into_iter().enumerate() {
            if let Err(err) = hook() {
                warn!(index, %err, "Shutdown hook failed");
            }
        }

        self.lifecycle.advance(Phase::Closed)?;
        info!("Container closed");
        Ok(())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("phase", &self.phase())
            .field("registered", &self.registry.len())
            .field("handlers", &self.handlers.len())
            .field("engine", &self.engine)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder};
    pub use crate::context::ResolveContext;
    pub use crate::decision::ProxyDecider;
    pub use crate::definition::Definition;
    pub use crate::descriptor::{Marker, MethodDescriptor, TypeDescriptor};
    pub use crate::error::{BoxError, HandlerInvocationError, Result, WardenError};
    pub use crate::handler::{Arguments, Invocation, MethodHandlerRegistration, Value};
    pub use crate::injection::Constructor;
    pub use crate::key::Dependency;
    pub use crate::lifecycle::{ContextReadyExtension, DefinitionsReadyExtension, PreDestroyProcessor};
    pub use crate::phase::Phase;
    pub use crate::provider::{Provider, Registrar};
    pub use crate::proxy::{Interceptable, ProxyCore};
    pub use crate::settings::ContainerSettings;
    #[cfg(feature = "async")]
    pub use crate::proxy::PendingCall;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WardenError;
    use crate::injection::Constructor;
    use crate::key::Dependency;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct Config {
        port: u16,
    }

    struct Server {
        config: Arc<Config>,
    }

    #[test]
    fn factory_called_once() {
        let counter = Arc::new(AtomicU32::new(0));

        let container = Container::builder()
            .register(
                Definition::of::<Config>()
                    .factory({
                        let counter = counter.clone();
                        move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(Config { port: 8080 })
                        }
                    })
                    .build(),
            )
            .build()
            .unwrap();

        let a: Arc<Config> = container.resolve().unwrap();
        let b: Arc<Config> = container.resolve().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.port, 8080);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn constructor_injection() {
        let container = Container::builder()
            .register(Definition::of::<Config>().default_constructor().build())
            .register(
                Definition::of::<Server>()
                    .constructor(Constructor::inject(vec![Dependency::of::<Config>()], |args| {
                        Ok(Server { config: args.next()? })
                    }))
                    .build(),
            )
            .build()
            .unwrap();

        let server: Arc<Server> = container.resolve().unwrap();
        let config: Arc<Config> = container.resolve().unwrap();
        assert!(Arc::ptr_eq(&server.config, &config));
    }

    #[test]
    fn not_registered_names_requirer() {
        let container = Container::builder()
            .register(
                Definition::of::<Server>()
                    .constructor(Constructor::inject(vec![Dependency::of::<Config>()], |args| {
                        Ok(Server { config: args.next()? })
                    }))
                    .build(),
            )
            .build()
            .unwrap();

        match container.resolve::<Server>() {
            Err(WardenError::Unregistered(e)) => {
                assert_eq!(e.requested, TypeKey::of::<Config>());
                assert_eq!(e.required_by.map(|id| id.to_string()).as_deref(), Some("Server"));
            }
            other => panic!("Expected Unregistered, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn register_instance_is_returned_as_is() {
        let container = Container::builder().build().unwrap();
        let config = Arc::new(Config { port: 1 });
        container.register_instance(config.clone()).unwrap();

        let resolved: Arc<Config> = container.resolve().unwrap();
        assert!(Arc::ptr_eq(&resolved, &config));
        assert!(!container.is_proxy(&resolved));
    }

    #[test]
    fn eager_definitions_built_at_startup() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();

        let container = Container::builder()
            .register(
                Definition::of::<Config>()
                    .eager()
                    .factory(move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(Config::default())
                    })
                    .build(),
            )
            .build()
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(container.beans_of_type::<Config>().len(), 1);
    }

    #[test]
    fn failed_construction_is_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();

        let container = Container::builder()
            .register(
                Definition::of::<Config>()
                    .factory(move |ctx| {
                        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                            return Err(ctx.failure("not yet"));
                        }
                        Ok(Config { port: 2 })
                    })
                    .build(),
            )
            .build()
            .unwrap();

        assert!(matches!(
            container.resolve::<Config>(),
            Err(WardenError::ConstructionFailed { .. })
        ));
        assert_eq!(container.resolve::<Config>().unwrap().port, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closed_container_rejects_resolution() {
        let container = Container::builder()
            .register(Definition::of::<Config>().default_constructor().build())
            .build()
            .unwrap();
        assert_eq!(container.phase(), Phase::Ready);

        container.shutdown().unwrap();
        assert_eq!(container.phase(), Phase::Closed);
        assert!(matches!(
            container.resolve::<Config>(),
            Err(WardenError::InvalidPhase { phase: Phase::Closed, .. })
        ));
        assert!(container.shutdown().is_err());
    }

    #[test]
    fn closed_container_rejects_handler_registration() {
        let container = Container::builder().build().unwrap();
        container
            .register_method_handler(MethodHandlerRegistration::new(|call| call.proceed()))
            .unwrap();
        container.shutdown().unwrap();

        assert!(matches!(
            container.register_method_handler(MethodHandlerRegistration::new(|call| call.proceed())),
            Err(WardenError::InvalidPhase { phase: Phase::Closed, .. })
        ));
        assert!(matches!(
            container.register_all_method_handlers(vec![MethodHandlerRegistration::new(|call| call.proceed())]),
            Err(WardenError::InvalidPhase { phase: Phase::Closed, .. })
        ));
        assert_eq!(container.handlers.len(), 1);
    }

    #[test]
    fn reregistering_a_cached_identity_keeps_the_instance() {
        let container = Container::builder()
            .register(Definition::of::<Config>().default_constructor().build())
            .build()
            .unwrap();
        let first = container.resolve::<Config>().unwrap();

        container
            .register(Definition::of::<Config>().factory(|_| Ok(Config { port: 9 })).build())
            .unwrap();
        container.register_instance(Arc::new(Config { port: 10 })).unwrap();

        let second = container.resolve::<Config>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.port, 0);
    }

    #[derive(Default)]
    struct Node {
        peer: once_cell::sync::OnceCell<Arc<Peer>>,
    }

    #[derive(Default)]
    struct Peer {
        node: once_cell::sync::OnceCell<Arc<Node>>,
    }

    #[test]
    fn field_cycle_resolves_to_same_instances() {
        let container = Container::builder()
            .register(
                Definition::of::<Node>()
                    .default_constructor()
                    .field(|this, ctx| {
                        let _ = this.peer.set(ctx.resolve::<Peer>()?);
                        Ok(())
                    })
                    .build(),
            )
            .register(
                Definition::of::<Peer>()
                    .default_constructor()
                    .field(|this, ctx| {
                        let _ = this.node.set(ctx.resolve::<Node>()?);
                        Ok(())
                    })
                    .build(),
            )
            .build()
            .unwrap();

        let node: Arc<Node> = container.resolve().unwrap();
        let peer = node.peer.get().unwrap();
        assert!(Arc::ptr_eq(peer.node.get().unwrap(), &node));
        assert!(Arc::ptr_eq(peer, &container.resolve::<Peer>().unwrap()));
    }

    #[test]
    fn debug_output() {
        let container = Container::builder().build().unwrap();
        let debug = format!("{container:?}");
        assert!(debug.contains("Container"));
        assert!(debug.contains("Ready"));
    }
}
