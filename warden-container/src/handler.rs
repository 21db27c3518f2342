//! Method handlers: interceptors selected by filters.
//!
//! A [`MethodHandlerRegistration`] pairs a handler body with three optional
//! filters. The [`HandlerRegistry`] keeps registrations in registration
//! order; at call time the first registration whose filters all match the
//! (receiver, method) pair wins.
//!
//! # Examples
//! ```
//! use warden_container::descriptor::Marker;
//! use warden_container::handler::{MethodHandlerRegistration, Value};
//!
//! const INTERCEPT: Marker = Marker::new("intercept");
//!
//! let registration = MethodHandlerRegistration::new(|_call| {
//!     Ok(Box::new(String::from("intercepted")) as Value)
//! })
//! .method_marker(INTERCEPT);
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::descriptor::{Marker, MethodDescriptor, ReceiverInfo, TypeDescriptor};
use crate::error::{BoxError, InvocationFailure};
use crate::key::TypeKey;

/// Type-erased return value of an intercepted call.
pub type Value = Box<dyn Any + Send>;

/// The pass-through to the real method.
pub type RealCall<'a> = Box<dyn FnOnce() -> Result<Value, BoxError> + 'a>;

/// Owned, type-erased arguments of an intercepted call, exposed to
/// handlers for inspection.
#[derive(Default)]
pub struct Arguments {
    values: Vec<Box<dyn Any + Send + Sync>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument.
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.values.push(Box::new(value));
        self
    }

    /// Returns argument `index` if it has type `T`.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments").field("len", &self.values.len()).finish()
    }
}

/// One intercepted call, as seen by a handler body.
pub struct Invocation<'a> {
    receiver: &'a ReceiverInfo,
    declaring: &'a TypeDescriptor,
    method: &'a MethodDescriptor,
    args: &'a Arguments,
    real: RealCall<'a>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        receiver: &'a ReceiverInfo,
        declaring: &'a TypeDescriptor,
        method: &'a MethodDescriptor,
        args: &'a Arguments,
        real: RealCall<'a>,
    ) -> Self {
        Self {
            receiver,
            declaring,
            method,
            args,
            real,
        }
    }

    pub fn receiver(&self) -> &ReceiverInfo {
        self.receiver
    }

    pub fn declaring(&self) -> &TypeDescriptor {
        self.declaring
    }

    pub fn method(&self) -> &MethodDescriptor {
        self.method
    }

    pub fn args(&self) -> &Arguments {
        self.args
    }

    /// Invokes the real method and returns its type-erased result.
    pub fn proceed(self) -> Result<Value, BoxError> {
        (self.real)()
    }

    /// Invokes the real method and downcasts its result.
    pub fn proceed_as<T: Any>(self) -> Result<T, BoxError> {
        let value = self.proceed()?;
        value
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| {
                InvocationFailure::ReturnTypeMismatch {
                    expected: type_name::<T>(),
                }
                .into()
            })
    }
}

/// A unit of interception logic.
///
/// Either returns a value directly, short-circuiting the real call, or
/// calls [`Invocation::proceed`] and post-processes the result.
pub trait MethodHandler: Send + Sync {
    fn handle(&self, call: Invocation<'_>) -> Result<Value, BoxError>;
}

impl<F> MethodHandler for F
where
    F: Fn(Invocation<'_>) -> Result<Value, BoxError> + Send + Sync,
{
    fn handle(&self, call: Invocation<'_>) -> Result<Value, BoxError> {
        self(call)
    }
}

/// A handler body plus its three optional filters.
///
/// A `None` filter is a wildcard.
#[derive(Clone)]
pub struct MethodHandlerRegistration {
    handler: Arc<dyn MethodHandler>,
    target: Option<TypeKey>,
    class_marker: Option<Marker>,
    method_marker: Option<Marker>,
}

impl MethodHandlerRegistration {
    /// A registration matching every call until filters are added.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(Invocation<'_>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::with_handler(body)
    }

    /// Same as [`new`](Self::new), for handler types implementing
    /// [`MethodHandler`] directly.
    pub fn with_handler(handler: impl MethodHandler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            target: None,
            class_marker: None,
            method_marker: None,
        }
    }

    /// Only match receivers that are instances of `T`.
    pub fn target<T: ?Sized + 'static>(mut self) -> Self {
        self.target = Some(TypeKey::of::<T>());
        self
    }

    /// Only match methods whose declaring type carries `marker`.
    pub fn class_marker(mut self, marker: Marker) -> Self {
        self.class_marker = Some(marker);
        self
    }

    /// Only match methods that carry `marker`.
    pub fn method_marker(mut self, marker: Marker) -> Self {
        self.method_marker = Some(marker);
        self
    }

    /// All three filters, ANDed.
    pub fn matches(
        &self,
        receiver: &ReceiverInfo,
        declaring: &TypeDescriptor,
        method: &MethodDescriptor,
    ) -> bool {
        self.target.is_none_or(|t| receiver.is_instance_of(&t))
            && self
                .class_marker
                .is_none_or(|m| receiver.declares(declaring, m))
            && self.method_marker.is_none_or(|m| method.has_marker(m))
    }

    pub(crate) fn handler(&self) -> &Arc<dyn MethodHandler> {
        &self.handler
    }
}

impl fmt::Debug for MethodHandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandlerRegistration")
            .field("target", &self.target)
            .field("class_marker", &self.class_marker)
            .field("method_marker", &self.method_marker)
            .finish()
    }
}

/// Stores handler registrations for one container, in registration order.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    registrations: RwLock<Vec<MethodHandlerRegistration>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registration: MethodHandlerRegistration) {
        debug!(?registration, "Registered method handler");
        self.registrations.write().push(registration);
    }

    pub fn register_all(&self, registrations: impl IntoIterator<Item = MethodHandlerRegistration>) {
        let mut guard = self.registrations.write();
        for registration in registrations {
            debug!(?registration, "Registered method handler");
            guard.push(registration);
        }
    }

    /// The first registration matching the call, if any.
    pub fn first_match(
        &self,
        receiver: &ReceiverInfo,
        declaring: &TypeDescriptor,
        method: &MethodDescriptor,
    ) -> Option<MethodHandlerRegistration> {
        let found = self
            .registrations
            .read()
            .iter()
            .find(|r| r.matches(receiver, declaring, method))
            .cloned();
        trace!(
            receiver = %receiver.identity,
            method = %format_args!("{}::{}", declaring.name(), method.name()),
            matched = found.is_some(),
            "Handler lookup"
        );
        found
    }

    /// Whether any registration matches at least one method of `declaring`.
    pub fn matches_any(&self, receiver: &ReceiverInfo, declaring: &TypeDescriptor) -> bool {
        let guard = self.registrations.read();
        declaring
            .methods()
            .iter()
            .any(|m| guard.iter().any(|r| r.matches(receiver, declaring, m)))
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::DefinitionId;

    const INTERCEPT: Marker = Marker::new("intercept");
    const SECURED: Marker = Marker::new("secured");

    const HELLO: MethodDescriptor = MethodDescriptor::new("hello").marked(&[INTERCEPT]);
    const OTHER: MethodDescriptor = MethodDescriptor::new("other");

    static GREETER: TypeDescriptor = TypeDescriptor::new("Greeter", &[HELLO, OTHER]);
    static VAULT: TypeDescriptor = TypeDescriptor::new("Vault", &[OTHER]).marked(&[SECURED]);

    trait Greeter {}
    struct EnglishGreeter;

    fn receiver() -> ReceiverInfo {
        ReceiverInfo {
            identity: DefinitionId::new(TypeKey::of::<EnglishGreeter>(), None),
            assignable: vec![TypeKey::of::<dyn Greeter>()],
            markers: vec![],
        }
    }

    fn returning(text: &'static str) -> MethodHandlerRegistration {
        MethodHandlerRegistration::new(move |_call| Ok(Box::new(text.to_string()) as Value))
    }

    #[test]
    fn wildcard_matches_everything() {
        let reg = returning("x");
        assert!(reg.matches(&receiver(), &GREETER, &HELLO));
        assert!(reg.matches(&receiver(), &VAULT, &OTHER));
    }

    #[test]
    fn method_marker_filter() {
        let reg = returning("x").method_marker(INTERCEPT);
        assert!(reg.matches(&receiver(), &GREETER, &HELLO));
        assert!(!reg.matches(&receiver(), &GREETER, &OTHER));
    }

    #[test]
    fn class_marker_filter() {
        let reg = returning("x").class_marker(SECURED);
        assert!(reg.matches(&receiver(), &VAULT, &OTHER));
        assert!(!reg.matches(&receiver(), &GREETER, &OTHER));
    }

    #[test]
    fn target_filter_uses_assignable_types() {
        assert!(returning("x").target::<dyn Greeter>().matches(&receiver(), &GREETER, &HELLO));
        assert!(returning("x").target::<EnglishGreeter>().matches(&receiver(), &GREETER, &HELLO));
        assert!(!returning("x").target::<String>().matches(&receiver(), &GREETER, &HELLO));
    }

    #[test]
    fn filters_are_anded() {
        let reg = returning("x").target::<dyn Greeter>().method_marker(INTERCEPT).class_marker(SECURED);
        assert!(!reg.matches(&receiver(), &GREETER, &HELLO));
    }

    #[test]
    fn first_registered_match_wins() {
        let registry = HandlerRegistry::new();
        registry.register_all([
            returning("first").method_marker(INTERCEPT),
            returning("second"),
        ]);

        let receiver = receiver();
        let args = Arguments::new();

        let found = registry.first_match(&receiver, &GREETER, &HELLO).unwrap();
        let call = Invocation::new(&receiver, &GREETER, &HELLO, &args, never_called());
        let value = found.handler().handle(call).unwrap();
        assert_eq!(*value.downcast::<String>().unwrap(), "first");

        let other = registry.first_match(&receiver, &GREETER, &OTHER).unwrap();
        let call = Invocation::new(&receiver, &GREETER, &OTHER, &args, never_called());
        let value = other.handler().handle(call).unwrap();
        assert_eq!(*value.downcast::<String>().unwrap(), "second");
    }

    fn never_called() -> RealCall<'static> {
        Box::new(|| -> Result<Value, BoxError> { panic!("real call must not run") })
    }

    #[test]
    fn matches_any_method_of_type() {
        let registry = HandlerRegistry::new();
        assert!(!registry.matches_any(&receiver(), &GREETER));

        registry.register(returning("x").method_marker(INTERCEPT));
        assert!(registry.matches_any(&receiver(), &GREETER));
        assert!(!registry.matches_any(&receiver(), &VAULT));
    }

    #[test]
    fn proceed_as_downcasts_real_result() {
        let args = Arguments::new().with(7u32);
        let receiver = receiver();
        let call = Invocation::new(
            &receiver,
            &GREETER,
            &HELLO,
            &args,
            Box::new(|| -> Result<Value, BoxError> { Ok(Box::new(String::from("original"))) }),
        );
        assert_eq!(call.args().get::<u32>(0), Some(&7));
        assert_eq!(call.proceed_as::<String>().unwrap(), "original");
    }

    #[test]
    fn proceed_as_reports_type_mismatch() {
        let args = Arguments::new();
        let receiver = receiver();
        let call = Invocation::new(
            &receiver,
            &GREETER,
            &HELLO,
            &args,
            Box::new(|| -> Result<Value, BoxError> { Ok(Box::new(5u8)) }),
        );
        let err = call.proceed_as::<String>().unwrap_err();
        assert!(err.downcast_ref::<InvocationFailure>().is_some());
    }
}
