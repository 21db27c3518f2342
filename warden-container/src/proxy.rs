//! Proxies for interceptable interfaces.
//!
//! An interface becomes interceptable by describing itself with a static
//! [`TypeDescriptor`] and providing a wrapper struct that forwards every
//! method through a [`ProxyCore`]:
//!
//! ```
//! use std::sync::Arc;
//! use warden_container::descriptor::{Marker, MethodDescriptor, TypeDescriptor};
//! use warden_container::error::HandlerInvocationError;
//! use warden_container::handler::Arguments;
//! use warden_container::proxy::{Interceptable, ProxyCore};
//!
//! const INTERCEPT: Marker = Marker::new("intercept");
//! const HELLO: MethodDescriptor = MethodDescriptor::new("hello").marked(&[INTERCEPT]);
//! static GREETER: TypeDescriptor = TypeDescriptor::new("Greeter", &[HELLO]);
//!
//! pub trait Greeter: Send + Sync {
//!     fn hello(&self) -> Result<String, HandlerInvocationError>;
//! }
//!
//! struct GreeterProxy {
//!     inner: Arc<dyn Greeter>,
//!     core: ProxyCore,
//! }
//!
//! impl Greeter for GreeterProxy {
//!     fn hello(&self) -> Result<String, HandlerInvocationError> {
//!         self.core.invoke(&HELLO, Arguments::new(), || Ok(self.inner.hello()?))
//!     }
//! }
//!
//! impl Interceptable for dyn Greeter {
//!     fn descriptor() -> &'static TypeDescriptor {
//!         &GREETER
//!     }
//!
//!     fn wrap(inner: Arc<Self>, core: ProxyCore) -> Arc<Self> {
//!         Arc::new(GreeterProxy { inner, core })
//!     }
//! }
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "async")]
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::descriptor::{MethodDescriptor, ReceiverInfo, TypeDescriptor};
use crate::dispatch::{self, CallTarget, Dispatcher};
use crate::error::{BoxError, HandlerInvocationError, InvocationFailure};
use crate::handler::{Arguments, Value};
#[cfg(feature = "async")]
use crate::pool::{TaskError, TaskHandle};

/// An interface (`dyn Trait`) the container can hand out as a proxy.
pub trait Interceptable: Send + Sync + 'static {
    /// Static description of the interface's methods and markers.
    fn descriptor() -> &'static TypeDescriptor;

    /// Wraps `inner` in the interface's proxy struct.
    fn wrap(inner: Arc<Self>, core: ProxyCore) -> Arc<Self>;
}

/// Per-proxy dispatch handle: who is being called and where calls go.
#[derive(Clone)]
pub struct ProxyCore {
    target: Arc<CallTarget>,
    dispatcher: Arc<Dispatcher>,
}

impl ProxyCore {
    pub(crate) fn new(
        declaring: &'static TypeDescriptor,
        receiver: Arc<ReceiverInfo>,
        tag: usize,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            target: Arc::new(CallTarget::new(receiver, declaring, tag)),
            dispatcher,
        }
    }

    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    /// Dispatches a synchronous call on the calling thread.
    ///
    /// `real` invokes the wrapped instance; it only runs if no handler
    /// matches or the matching handler proceeds.
    pub fn invoke<R, F>(&self, method: &MethodDescriptor, args: Arguments, real: F) -> Result<R, HandlerInvocationError>
    where
        R: Any + Send,
        F: FnOnce() -> Result<R, BoxError>,
    {
        let value = self.dispatcher.dispatch(
            &self.target,
            method,
            &args,
            Box::new(move || real().map(|r| Box::new(r) as Value)),
        )?;
        downcast_value(self.target.declaring().name(), method.name(), value)
    }

    /// Dispatches a call on the container's worker pool and returns at once.
    ///
    /// Handler matching, the handler body and the real call all run on a
    /// pool thread, never on the caller's.
    #[cfg(feature = "async")]
    pub fn invoke_async<R, F>(&self, method: &'static MethodDescriptor, args: Arguments, real: F) -> PendingCall<R>
    where
        R: Send + 'static,
        F: FnOnce() -> Result<R, BoxError> + Send + 'static,
    {
        let target = self.target.clone();
        let handlers = self.dispatcher.handlers().clone();
        let declaring = target.declaring().name();
        let task = self.dispatcher.pool().spawn(async move {
            let value = dispatch::route(
                &handlers,
                &target,
                method,
                &args,
                Box::new(move || real().map(|r| Box::new(r) as Value)),
            )?;
            downcast_value(target.declaring().name(), method.name(), value)
        });
        PendingCall {
            state: CallState::Running(task),
            declaring,
            method: method.name(),
        }
    }

    /// The describe label, `Interface@<hex tag>`.
    pub fn describe(&self) -> String {
        self.invoke(&MethodDescriptor::DESCRIBE, Arguments::new(), || {
            Ok(self.target.label())
        })
        .unwrap_or_else(|_| self.target.label())
    }
}

impl fmt::Debug for ProxyCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn downcast_value<R: Any>(
    declaring: &'static str,
    method: &'static str,
    value: Value,
) -> Result<R, HandlerInvocationError> {
    value.downcast::<R>().map(|v| *v).map_err(|_| {
        HandlerInvocationError::new(
            declaring,
            method,
            InvocationFailure::ReturnTypeMismatch {
                expected: type_name::<R>(),
            },
        )
    })
}

/// Result of an asynchronous intercepted call.
///
/// Block on it with [`wait`](Self::wait), or `.await` it. Implementations
/// of asynchronous interface methods return [`PendingCall::ready`]; the
/// proxy in front of them returns a call running on the worker pool.
#[cfg(feature = "async")]
pub struct PendingCall<R> {
    state: CallState<R>,
    declaring: &'static str,
    method: &'static str,
}

// No field is structurally pinned.
#[cfg(feature = "async")]
impl<R> Unpin for PendingCall<R> {}

#[cfg(feature = "async")]
enum CallState<R> {
    Done(Option<Result<R, HandlerInvocationError>>),
    Running(TaskHandle<Result<R, HandlerInvocationError>>),
}

#[cfg(feature = "async")]
impl<R> PendingCall<R> {
    /// An already completed call.
    pub fn ready(value: R) -> Self {
        Self::completed(Ok(value))
    }

    /// An already completed call with the given outcome.
    pub fn completed(result: Result<R, HandlerInvocationError>) -> Self {
        Self {
            state: CallState::Done(Some(result)),
            declaring: "",
            method: "",
        }
    }

    /// Blocks until the call completes. Must not be used inside an
    /// asynchronous context unless the call is already complete.
    pub fn wait(self) -> Result<R, HandlerInvocationError> {
        let (declaring, method) = (self.declaring, self.method);
        match self.state {
            CallState::Done(result) => result.unwrap_or_else(|| Err(task_failure(declaring, method, TaskError::Cancelled))),
            CallState::Running(task) => task
                .wait()
                .unwrap_or_else(|err| Err(task_failure(declaring, method, err))),
        }
    }

    /// Cancels the call if it has not started running.
    pub fn cancel(&self) {
        if let CallState::Running(task) = &self.state {
            task.cancel();
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            CallState::Done(_) => true,
            CallState::Running(task) => task.is_finished(),
        }
    }
}

#[cfg(feature = "async")]
impl<R> Future for PendingCall<R> {
    type Output = Result<R, HandlerInvocationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let (declaring, method) = (this.declaring, this.method);
        match &mut this.state {
            CallState::Done(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(task_failure(declaring, method, TaskError::Cancelled))),
            ),
            CallState::Running(task) => Pin::new(task)
                .poll(cx)
                .map(|done| done.unwrap_or_else(|err| Err(task_failure(declaring, method, err)))),
        }
    }
}

#[cfg(feature = "async")]
impl<R> fmt::Debug for PendingCall<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("method", &format_args!("{}::{}", self.declaring, self.method))
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(feature = "async")]
fn task_failure(declaring: &'static str, method: &'static str, err: TaskError) -> HandlerInvocationError {
    let failure = match err {
        TaskError::Cancelled => InvocationFailure::Cancelled,
        TaskError::Rejected => InvocationFailure::Rejected,
    };
    HandlerInvocationError::new(declaring, method, failure)
}
