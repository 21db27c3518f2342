//! Per-call resolution context.
//!
//! Factories and field injectors receive a [`ResolveContext`] and resolve
//! their own dependencies through it, so nested resolutions share one
//! resolution path and cycle detection sees the whole chain.

use std::sync::Arc;

use crate::engine::Engine;
use crate::error::{BoxError, Result, WardenError};
use crate::injection::downcast;
use crate::key::{DefinitionId, TypeKey};
use crate::path::ResolutionPath;

/// State carried through one logical resolution call.
pub struct ResolveContext<'a> {
    engine: &'a Engine,
    path: ResolutionPath,
    bootstrapping_deciders: bool,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            path: ResolutionPath::new(),
            bootstrapping_deciders: false,
        }
    }

    /// Resolves the single (or primary) bean assignable to `T`.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        self.resolve_qualified::<T>(None)
    }

    /// Resolves the bean assignable to `T` registered with `qualifier`.
    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&mut self, qualifier: &str) -> Result<Arc<T>> {
        self.resolve_qualified::<T>(Some(qualifier))
    }

    /// Resolves every definition assignable to `T`, in registration order.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Vec<Arc<T>>> {
        let key = TypeKey::of::<T>();
        let engine = self.engine;
        engine
            .registry()
            .definitions(&key)
            .iter()
            .map(|def| {
                let handle = engine.resolve_definition(def, key, self)?;
                downcast::<T>(&handle, def.id())
            })
            .collect()
    }

    fn resolve_qualified<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        qualifier: Option<&str>,
    ) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        let engine = self.engine;
        let handle = engine.resolve_key(key, qualifier, self)?;
        downcast::<T>(&handle, &key)
    }

    /// Identities currently under construction, outermost first.
    pub fn path(&self) -> &ResolutionPath {
        &self.path
    }

    /// The identity being constructed, if any.
    pub fn current(&self) -> Option<&DefinitionId> {
        self.path.current()
    }

    /// Wraps a user error as a construction failure of the current identity.
    pub fn failure(&self, source: impl Into<BoxError>) -> WardenError {
        match self.current() {
            Some(id) => WardenError::construction(id, source),
            None => WardenError::ConstructionFailed {
                identity: "<root>".to_owned(),
                source: source.into(),
            },
        }
    }

    pub(crate) fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub(crate) fn path_mut(&mut self) -> &mut ResolutionPath {
        &mut self.path
    }

    pub(crate) fn bootstrapping_deciders(&self) -> bool {
        self.bootstrapping_deciders
    }

    /// Sets the decider bootstrap flag, returning the previous value.
    pub(crate) fn set_bootstrapping_deciders(&mut self, value: bool) -> bool {
        std::mem::replace(&mut self.bootstrapping_deciders, value)
    }
}

impl std::fmt::Debug for ResolveContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveContext")
            .field("path", &self.path)
            .field("bootstrapping_deciders", &self.bootstrapping_deciders)
            .finish()
    }
}
