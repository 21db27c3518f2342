//! Proxy decisions: does a freshly built bean need wrapping?
//!
//! Deciders are ordinary beans exposing `dyn ProxyDecider`. They are
//! loaded lazily the first time a decision is needed, by walking their
//! definitions directly. While they load, the resolution context carries
//! a "bootstrapping deciders" flag: a decision requested from inside that
//! bootstrap skips it and uses the deciders loaded so far.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::context::ResolveContext;
use crate::definition::Definition;
use crate::error::Result;
use crate::handler::HandlerRegistry;
use crate::injection::downcast;
use crate::key::TypeKey;

/// Votes on whether a bean should be proxied. One `true` vote is enough.
pub trait ProxyDecider: Send + Sync {
    fn should_proxy(&self, definition: &Definition) -> bool;
}

pub(crate) struct DecisionService {
    deciders: RwLock<Vec<Arc<dyn ProxyDecider>>>,
    bootstrapped: AtomicBool,
    bootstrap_runs: AtomicUsize,
}

impl DecisionService {
    pub(crate) fn new() -> Self {
        Self {
            deciders: RwLock::new(Vec::new()),
            bootstrapped: AtomicBool::new(false),
            bootstrap_runs: AtomicUsize::new(0),
        }
    }

    pub(crate) fn should_proxy(&self, definition: &Definition, ctx: &mut ResolveContext<'_>) -> Result<bool> {
        let decider_key = TypeKey::of::<dyn ProxyDecider>();
        if definition.is_assignable_to(&decider_key) {
            return Ok(false);
        }

        if ctx.bootstrapping_deciders() {
            trace!(identity = %definition.id(), "Decider bootstrap in progress, using deciders loaded so far");
        } else if !self.bootstrapped.swap(true, Ordering::AcqRel) {
            self.bootstrap(ctx)?;
        }

        let deciders = self.deciders.read().clone();
        let decision = deciders.iter().any(|d| d.should_proxy(definition));
        debug!(identity = %definition.id(), decision, "Proxy decision");
        Ok(decision)
    }

    fn bootstrap(&self, ctx: &mut ResolveContext<'_>) -> Result<()> {
        self.bootstrap_runs.fetch_add(1, Ordering::SeqCst);
        let previous = ctx.set_bootstrapping_deciders(true);
        let loaded = self.load_deciders(ctx);
        ctx.set_bootstrapping_deciders(previous);
        loaded
    }

    fn load_deciders(&self, ctx: &mut ResolveContext<'_>) -> Result<()> {
        let key = TypeKey::of::<dyn ProxyDecider>();
        let engine = ctx.engine();
        let definitions = engine.registry().definitions(&key);
        debug!(count = definitions.len(), "Bootstrapping proxy deciders");

        for definition in &definitions {
            let handle = engine.resolve_definition(definition, key, ctx)?;
            let decider = downcast::<dyn ProxyDecider>(&handle, definition.id())?;
            self.deciders.write().push(decider);
        }
        Ok(())
    }

    pub(crate) fn bootstrap_count(&self) -> usize {
        self.bootstrap_runs.load(Ordering::SeqCst)
    }
}

/// Proxies a bean when a registered method handler would match at least
/// one method of one of its interceptable interfaces.
pub struct HandlerMatchDecider {
    handlers: Arc<HandlerRegistry>,
}

impl HandlerMatchDecider {
    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }
}

impl ProxyDecider for HandlerMatchDecider {
    fn should_proxy(&self, definition: &Definition) -> bool {
        let receiver = definition.receiver_info();
        definition
            .interceptable()
            .any(|declaring| self.handlers.matches_any(&receiver, declaring))
    }
}

/// Proxies a bean when one of its interceptable interfaces declares an
/// asynchronous method.
#[derive(Debug, Default)]
pub struct AsyncMethodDecider;

impl ProxyDecider for AsyncMethodDecider {
    fn should_proxy(&self, definition: &Definition) -> bool {
        definition
            .interceptable()
            .any(|declaring| declaring.methods().iter().any(|m| m.is_asynchronous()))
    }
}
