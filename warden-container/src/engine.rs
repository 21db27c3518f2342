//! The resolution engine: builds, wires and caches singletons.
//!
//! # Algorithm
//! 1. Look up the definition; unknown types fail fast.
//! 2. Return the cached bean if there is one.
//! 3. Push the identity on the resolution path (cycle check).
//! 4. Construct it: factory, else the widest satisfiable marked
//!    constructor, else the no-argument constructor.
//! 5. Ask the decision service whether to proxy and assemble the views
//!    (proxies included), then cache them as an *early* entry.
//! 6. Run field injectors; a field cycle finds the early entry and gets
//!    the same handles every later caller gets.
//! 7. Promote the entry to ready.
//! 8. Pop the path. On failure, evict the early entry.
//!
//! A cached bean is never replaced: registering a definition again only
//! affects identities that were not instantiated yet.
//!
//! # Concurrency
//! Completed beans are read without locking. Construction runs under one
//! container-wide re-entrant lock: a thread racing for the same identity
//! waits, re-checks the cache and reuses the first result, so every
//! constructor runs at most once. Early entries are only observable while
//! holding that lock, that is, from inside the chain that created them.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::ReentrantMutex;
use tracing::{debug, instrument, trace};

use crate::context::ResolveContext;
use crate::decision::DecisionService;
use crate::definition::Definition;
use crate::dispatch::Dispatcher;
use crate::error::{ProxyCreationError, Result, WardenError};
use crate::injection::{AnyHandle, ErasedConstructor, ResolvedArgs, ResolvedDependency};
use crate::key::{DefinitionId, TypeKey};
use crate::proxy::ProxyCore;
use crate::registry::DefinitionRegistry;

/// A fully wired singleton and the handles it is given out as.
pub(crate) struct Bean {
    definition: Arc<Definition>,
    raw: AnyHandle,
    views: HashMap<TypeKey, AnyHandle>,
    proxied: bool,
    addresses: Vec<usize>,
}

impl Bean {
    /// The handle for `key`. A proxied bean is only available through its
    /// interceptable views.
    pub(crate) fn view(&self, key: &TypeKey) -> Result<AnyHandle> {
        if let Some(handle) = self.views.get(key) {
            return Ok(handle.clone());
        }
        if self.proxied && self.definition.is_assignable_to(key) {
            return Err(WardenError::ProxyCreation(ProxyCreationError {
                identity: self.definition.id().clone(),
                requested: *key,
                reason: "an intercepted bean is only available through its interceptable interfaces"
                    .to_owned(),
            }));
        }
        Err(WardenError::TypeMismatch {
            identity: self.definition.id().to_string(),
            expected: key.type_name(),
        })
    }
}

#[derive(Clone)]
enum Slot {
    /// Constructed, field injection still running.
    Early(Arc<Bean>),
    Ready(Arc<Bean>),
}

pub(crate) struct Engine {
    registry: Arc<DefinitionRegistry>,
    cache: DashMap<DefinitionId, Slot>,
    creation: ReentrantMutex<()>,
    decisions: DecisionService,
    dispatcher: Arc<Dispatcher>,
    proxies: DashSet<usize>,
}

impl Engine {
    pub(crate) fn new(registry: Arc<DefinitionRegistry>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
            creation: ReentrantMutex::new(()),
            decisions: DecisionService::new(),
            dispatcher,
            proxies: DashSet::new(),
        }
    }

    pub(crate) fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    pub(crate) fn decisions(&self) -> &DecisionService {
        &self.decisions
    }

    /// Registers a definition. A definition around a prebuilt instance is
    /// cached as-is, unproxied. An identity that is already cached keeps
    /// its bean.
    pub(crate) fn register(&self, definition: Definition) -> Result<Arc<Definition>> {
        let definition = self.registry.register(definition);
        if self.cached(definition.id()).is_some() {
            debug!(identity = %definition.id(), "Replaced definition keeps its cached bean");
            return Ok(definition);
        }
        if let Some(raw) = definition.prebuilt().cloned() {
            let bean = self.assemble(&definition, raw, false)?;
            self.cache
                .insert(definition.id().clone(), Slot::Ready(Arc::new(bean)));
            debug!(identity = %definition.id(), "Cached prebuilt instance");
        }
        Ok(definition)
    }

    /// Resolves `key` (optionally qualified) to a handle of type `key`.
    pub(crate) fn resolve_key(
        &self,
        key: TypeKey,
        qualifier: Option<&str>,
        ctx: &mut ResolveContext<'_>,
    ) -> Result<AnyHandle> {
        trace!(key = %key, ?qualifier, depth = ctx.path().len(), "Resolving");
        let definition = self
            .registry
            .definition(&key, qualifier)
            .map_err(|e| e.required_by(ctx.current()))?;
        self.resolve_definition(&definition, key, ctx)
    }

    /// Resolves a known definition as `key`.
    pub(crate) fn resolve_definition(
        &self,
        definition: &Arc<Definition>,
        key: TypeKey,
        ctx: &mut ResolveContext<'_>,
    ) -> Result<AnyHandle> {
        self.instantiate(definition, ctx)?.view(&key)
    }

    /// Returns the cached bean for `definition`, creating it if needed.
    pub(crate) fn instantiate(
        &self,
        definition: &Arc<Definition>,
        ctx: &mut ResolveContext<'_>,
    ) -> Result<Arc<Bean>> {
        if let Some(bean) = self.cached(definition.id()) {
            return Ok(bean);
        }

        let _creation = self.creation.lock();
        match self.slot(definition.id()) {
            Some(Slot::Ready(bean)) => return Ok(bean),
            Some(Slot::Early(bean)) => {
                trace!(identity = %definition.id(), "Handing out early reference");
                return Ok(bean);
            }
            None => {}
        }

        ctx.path_mut().enter(definition.id())?;
        let created = self.create(definition, ctx);
        ctx.path_mut().leave();

        created.inspect_err(|_| self.evict(definition.id()))
    }

    fn evict(&self, id: &DefinitionId) {
        if let Some((_, Slot::Early(bean) | Slot::Ready(bean))) = self.cache.remove(id) {
            for address in &bean.addresses {
                self.proxies.remove(address);
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(identity = %definition.id()))]
    fn create(&self, definition: &Arc<Definition>, ctx: &mut ResolveContext<'_>) -> Result<Arc<Bean>> {
        let raw = self.construct(definition, ctx)?;
        let proxied = self.decisions.should_proxy(definition, ctx)?;
        let bean = Arc::new(self.assemble(definition, raw, proxied)?);
        self.cache
            .insert(definition.id().clone(), Slot::Early(bean.clone()));

        for inject in definition.injectors() {
            inject(&bean.raw, ctx)?;
        }

        self.cache
            .insert(definition.id().clone(), Slot::Ready(bean.clone()));
        debug!(identity = %definition.id(), proxied, "Cached singleton");
        Ok(bean)
    }

    fn construct(&self, definition: &Definition, ctx: &mut ResolveContext<'_>) -> Result<AnyHandle> {
        if let Some(factory) = definition.factory() {
            return factory(ctx);
        }

        let constructor = self.select_constructor(definition)?;
        let mut values = Vec::with_capacity(constructor.params.len());
        for dependency in &constructor.params {
            let instance = self.resolve_key(dependency.key, dependency.qualifier.as_deref(), ctx)?;
            values.push(ResolvedDependency {
                dependency: dependency.clone(),
                instance,
            });
        }
        constructor.invoke(&mut ResolvedArgs::new(definition.id().clone(), values))
    }

    /// Marked candidate with the most resolvable parameters, else the
    /// no-argument candidate, else the widest marked candidate.
    fn select_constructor<'d>(&self, definition: &'d Definition) -> Result<&'d ErasedConstructor> {
        let candidates = definition.constructors();
        let resolvable = |c: &&ErasedConstructor| {
            c.params
                .iter()
                .all(|p| self.registry.definition(&p.key, p.qualifier.as_deref()).is_ok())
        };

        candidates
            .iter()
            .filter(|c| c.marked)
            .filter(resolvable)
            .rev()
            .max_by_key(|c| c.params.len())
            .or_else(|| candidates.iter().find(|c| c.params.is_empty()))
            .or_else(|| {
                candidates
                    .iter()
                    .filter(|c| c.marked)
                    .rev()
                    .max_by_key(|c| c.params.len())
            })
            .ok_or_else(|| {
                WardenError::construction(
                    definition.id(),
                    "no factory, constructor or instance is defined",
                )
            })
    }

    /// Builds the handle table of a bean, wrapping interceptable views
    /// when `proxied`.
    fn assemble(&self, definition: &Arc<Definition>, raw: AnyHandle, proxied: bool) -> Result<Bean> {
        let mut views = HashMap::new();
        let mut addresses = Vec::new();
        let mismatch = |key: TypeKey| WardenError::TypeMismatch {
            identity: definition.id().to_string(),
            expected: key.type_name(),
        };

        if proxied {
            let receiver = Arc::new(definition.receiver_info());
            let tag = Arc::as_ptr(&raw) as *const () as usize;
            for view in definition.views() {
                let Some(spec) = &view.proxy else { continue };
                let handle = view.cast(&raw).ok_or_else(|| mismatch(view.key))?;
                let core = ProxyCore::new(spec.descriptor, receiver.clone(), tag, self.dispatcher.clone());
                let (proxy, address) = spec.wrap(&handle, core).ok_or_else(|| {
                    WardenError::ProxyCreation(ProxyCreationError {
                        identity: definition.id().clone(),
                        requested: view.key,
                        reason: "the proxy wrapper rejected the instance".to_owned(),
                    })
                })?;
                addresses.push(address);
                views.insert(view.key, proxy);
            }
            if views.is_empty() {
                return Err(WardenError::ProxyCreation(ProxyCreationError {
                    identity: definition.id().clone(),
                    requested: definition.requested(),
                    reason: "interception was requested but the bean exposes no interceptable interface"
                        .to_owned(),
                }));
            }
        } else {
            views.insert(definition.concrete(), raw.clone());
            for view in definition.views() {
                views.insert(view.key, view.cast(&raw).ok_or_else(|| mismatch(view.key))?);
            }
        }

        for address in &addresses {
            self.proxies.insert(*address);
        }
        Ok(Bean {
            definition: definition.clone(),
            raw,
            views,
            proxied,
            addresses,
        })
    }

    fn slot(&self, id: &DefinitionId) -> Option<Slot> {
        self.cache.get(id).map(|entry| entry.value().clone())
    }

    /// Cached beans assignable to `key`, in registration order.
    pub(crate) fn beans_of_type(&self, key: TypeKey) -> Vec<AnyHandle> {
        self.registry
            .definitions(&key)
            .iter()
            .filter_map(|def| match self.slot(def.id()) {
                Some(Slot::Ready(bean)) => bean.view(&key).ok(),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn cached(&self, id: &DefinitionId) -> Option<Arc<Bean>> {
        match self.slot(id) {
            Some(Slot::Ready(bean)) => Some(bean),
            _ => None,
        }
    }

    pub(crate) fn is_proxy(&self, address: usize) -> bool {
        self.proxies.contains(&address)
    }

    /// Invokes reload callbacks of cached beans in registration order.
    pub(crate) fn reload(&self) -> usize {
        self.registry
            .all()
            .iter()
            .filter_map(|def| self.cached(def.id()))
            .filter(|bean| bean.definition.reload(&bean.raw))
            .count()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("definitions", &self.registry.len())
            .field("cached", &self.cache.len())
            .field("proxies", &self.proxies.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerRegistry;
    use crate::injection::{Constructor, downcast};
    use crate::key::Dependency;
    #[cfg(feature = "async")]
    use crate::pool::WorkerPool;

    #[derive(Default)]
    struct Config;
    struct Missing;

    struct Report {
        built_by: &'static str,
    }

    fn engine(definitions: Vec<Definition>) -> Engine {
        let handlers = Arc::new(HandlerRegistry::new());
        #[cfg(feature = "async")]
        let dispatcher = Dispatcher::new(handlers, Arc::new(WorkerPool::new(1, "engine-test")));
        #[cfg(not(feature = "async"))]
        let dispatcher = Dispatcher::new(handlers);

        let engine = Engine::new(Arc::new(DefinitionRegistry::new()), Arc::new(dispatcher));
        for definition in definitions {
            engine.register(definition).unwrap();
        }
        engine
    }

    fn resolve<T: ?Sized + Send + Sync + 'static>(engine: &Engine) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        let mut ctx = ResolveContext::new(engine);
        let handle = engine.resolve_key(key, None, &mut ctx)?;
        downcast::<T>(&handle, &key)
    }

    fn report(built_by: &'static str, params: Vec<Dependency>) -> Constructor<Report> {
        Constructor::inject(params, move |_| Ok(Report { built_by }))
    }

    #[test]
    fn widest_satisfiable_marked_constructor_wins() {
        let engine = engine(vec![
            Definition::of::<Config>().default_constructor().build(),
            Definition::of::<Report>()
                .constructor(Constructor::no_args(|| Ok(Report { built_by: "no-args" })))
                .constructor(report("config", vec![Dependency::of::<Config>()]))
                .constructor(report(
                    "config+missing",
                    vec![Dependency::of::<Config>(), Dependency::of::<Missing>()],
                ))
                .build(),
        ]);

        assert_eq!(resolve::<Report>(&engine).unwrap().built_by, "config");
    }

    #[test]
    fn first_registered_wins_a_tie() {
        let engine = engine(vec![
            Definition::of::<Config>().default_constructor().build(),
            Definition::of::<Report>()
                .constructor(report("first", vec![Dependency::of::<Config>()]))
                .constructor(report("second", vec![Dependency::of::<Config>()]))
                .build(),
        ]);

        assert_eq!(resolve::<Report>(&engine).unwrap().built_by, "first");
    }

    #[test]
    fn falls_back_to_no_args_constructor() {
        let engine = engine(vec![
            Definition::of::<Report>()
                .constructor(report("missing", vec![Dependency::of::<Missing>()]))
                .constructor(Constructor::no_args(|| Ok(Report { built_by: "no-args" })))
                .build(),
        ]);

        assert_eq!(resolve::<Report>(&engine).unwrap().built_by, "no-args");
    }

    #[test]
    fn unsatisfiable_marked_constructor_reports_the_gap() {
        let engine = engine(vec![
            Definition::of::<Report>()
                .constructor(report("missing", vec![Dependency::of::<Missing>()]))
                .build(),
        ]);

        match resolve::<Report>(&engine) {
            Err(WardenError::Unregistered(e)) => {
                assert_eq!(e.requested, TypeKey::of::<Missing>());
                assert_eq!(e.required_by.map(|id| id.to_string()).as_deref(), Some("Report"));
            }
            other => panic!("Expected Unregistered, got: {:?}", other.map(|r| r.built_by)),
        }
    }

    #[test]
    fn definition_without_recipe_fails() {
        let engine = engine(vec![Definition::of::<Report>().build()]);
        assert!(matches!(
            resolve::<Report>(&engine),
            Err(WardenError::ConstructionFailed { .. })
        ));
    }

    #[test]
    fn failed_field_injection_evicts_early_entry() {
        let engine = engine(vec![
            Definition::of::<Config>()
                .default_constructor()
                .field(|_, ctx| ctx.resolve::<Missing>().map(|_| ()))
                .build(),
        ]);

        assert!(resolve::<Config>(&engine).is_err());
        assert!(engine.cached(&DefinitionId::new(TypeKey::of::<Config>(), None)).is_none());
        assert_eq!(engine.cache.len(), 0);
    }

    #[test]
    fn replacing_a_definition_keeps_the_cached_bean() {
        let engine = engine(vec![
            Definition::of::<Report>()
                .constructor(Constructor::no_args(|| Ok(Report { built_by: "old" })))
                .build(),
        ]);
        let first = resolve::<Report>(&engine).unwrap();

        engine
            .register(
                Definition::of::<Report>()
                    .constructor(Constructor::no_args(|| Ok(Report { built_by: "new" })))
                    .build(),
            )
            .unwrap();
        let second = resolve::<Report>(&engine).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.built_by, "old");
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn replacing_an_uninstantiated_definition_takes_effect() {
        let engine = engine(vec![
            Definition::of::<Report>()
                .constructor(Constructor::no_args(|| Ok(Report { built_by: "old" })))
                .build(),
        ]);
        engine
            .register(
                Definition::of::<Report>()
                    .constructor(Constructor::no_args(|| Ok(Report { built_by: "new" })))
                    .build(),
            )
            .unwrap();
        assert_eq!(resolve::<Report>(&engine).unwrap().built_by, "new");
    }

    #[test]
    fn preloaded_instance_is_cached_unproxied() {
        let engine = engine(vec![]);
        let config = Arc::new(Config);
        engine.register(Definition::instance(config.clone()).build()).unwrap();
        assert!(engine.cached(&DefinitionId::new(TypeKey::of::<Config>(), None)).is_some());

        let resolved = resolve::<Config>(&engine).unwrap();
        assert!(Arc::ptr_eq(&resolved, &config));
        assert!(!engine.is_proxy(Arc::as_ptr(&resolved) as *const () as usize));
        assert_eq!(engine.decisions().bootstrap_count(), 0);
    }
}
