//! Call dispatch for proxied beans.
//!
//! For every intercepted call the [`Dispatcher`] answers the describe
//! method itself, otherwise runs the first matching handler, otherwise
//! falls through to the real method. Every failure on the way comes back
//! as a [`HandlerInvocationError`] naming the interface and method.

use std::sync::Arc;

use tracing::trace;

use crate::descriptor::{MethodDescriptor, ReceiverInfo, TypeDescriptor};
use crate::error::{BoxError, HandlerInvocationError};
use crate::handler::{Arguments, HandlerRegistry, Invocation, RealCall, Value};
#[cfg(feature = "async")]
use crate::pool::WorkerPool;

/// The instance side of one proxied interface.
#[derive(Debug)]
pub struct CallTarget {
    receiver: Arc<ReceiverInfo>,
    declaring: &'static TypeDescriptor,
    tag: usize,
}

impl CallTarget {
    pub(crate) fn new(receiver: Arc<ReceiverInfo>, declaring: &'static TypeDescriptor, tag: usize) -> Self {
        Self {
            receiver,
            declaring,
            tag,
        }
    }

    pub fn receiver(&self) -> &ReceiverInfo {
        &self.receiver
    }

    pub fn declaring(&self) -> &'static TypeDescriptor {
        self.declaring
    }

    /// `Interface@<hex tag>`, the answer to the describe method.
    pub fn label(&self) -> String {
        format!("{}@{:x}", self.declaring.name(), self.tag)
    }
}

/// Routes intercepted calls through the handler registry.
pub struct Dispatcher {
    handlers: Arc<HandlerRegistry>,
    #[cfg(feature = "async")]
    pool: Arc<WorkerPool>,
}

impl Dispatcher {
    #[cfg(feature = "async")]
    pub(crate) fn new(handlers: Arc<HandlerRegistry>, pool: Arc<WorkerPool>) -> Self {
        Self { handlers, pool }
    }

    #[cfg(not(feature = "async"))]
    pub(crate) fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    #[cfg(feature = "async")]
    pub(crate) fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Dispatches one call.
    ///
    /// # Errors
    /// [`HandlerInvocationError`] wrapping whatever the handler body or
    /// the real method returned.
    pub fn dispatch(
        &self,
        target: &CallTarget,
        method: &MethodDescriptor,
        args: &Arguments,
        real: RealCall<'_>,
    ) -> Result<Value, HandlerInvocationError> {
        route(&self.handlers, target, method, args, real)
    }
}

/// Dispatch against a handler registry alone. Pool tasks call this so they
/// never keep the pool itself alive.
pub(crate) fn route(
    handlers: &HandlerRegistry,
    target: &CallTarget,
    method: &MethodDescriptor,
    args: &Arguments,
    real: RealCall<'_>,
) -> Result<Value, HandlerInvocationError> {
    if method.is_describe() {
        return Ok(Box::new(target.label()));
    }

    let declaring = target.declaring;
    let wrap = |source: BoxError| HandlerInvocationError::new(declaring.name(), method.name(), source);

    match handlers.first_match(&target.receiver, declaring, method) {
        Some(registration) => {
            trace!(target = %target.label(), method = method.name(), "Dispatching to handler");
            let call = Invocation::new(&target.receiver, declaring, method, args, real);
            registration.handler().handle(call).map_err(wrap)
        }
        None => real().map_err(wrap),
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
