//! Constructor candidates and their resolved arguments.
//!
//! A [`Constructor`] declares the dependencies it needs. The engine
//! resolves them in order and hands them over as [`ResolvedArgs`], which
//! the constructor body consumes with [`ResolvedArgs::next`].

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, WardenError};
use crate::key::{DefinitionId, Dependency};

/// Type-erased handle to a live instance. The inner value is always an
/// `Arc<T>` for the type `T` the handle was produced as.
pub(crate) type AnyHandle = Arc<dyn Any + Send + Sync>;

pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> AnyHandle {
    Arc::new(instance)
}

pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(
    handle: &AnyHandle,
    identity: &impl fmt::Display,
) -> Result<Arc<T>> {
    handle
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| WardenError::TypeMismatch {
            identity: identity.to_string(),
            expected: type_name::<T>(),
        })
}

type BuildFn = Arc<dyn Fn(&mut ResolvedArgs) -> Result<AnyHandle> + Send + Sync>;

/// A way to build `C` from a list of resolved dependencies.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use warden_container::injection::Constructor;
/// use warden_container::key::Dependency;
///
/// trait Logger: Send + Sync {}
/// struct Service { logger: Arc<dyn Logger> }
///
/// let ctor = Constructor::inject(vec![Dependency::of::<dyn Logger>()], |args| {
///     Ok(Service { logger: args.next::<dyn Logger>()? })
/// });
/// assert!(ctor.is_marked());
/// assert_eq!(ctor.params().len(), 1);
/// ```
pub struct Constructor<C> {
    params: Vec<Dependency>,
    marked: bool,
    build: Arc<dyn Fn(&mut ResolvedArgs) -> Result<C> + Send + Sync>,
}

impl<C: Send + Sync + 'static> Constructor<C> {
    /// A constructor marked for injection.
    pub fn inject<F>(params: Vec<Dependency>, build: F) -> Self
    where
        F: Fn(&mut ResolvedArgs) -> Result<C> + Send + Sync + 'static,
    {
        Self {
            params,
            marked: true,
            build: Arc::new(build),
        }
    }

    /// The unmarked no-argument constructor, used when no marked candidate
    /// can be satisfied.
    pub fn no_args<F>(build: F) -> Self
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            marked: false,
            build: Arc::new(move |_| build()),
        }
    }

    pub fn params(&self) -> &[Dependency] {
        &self.params
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }

    pub(crate) fn erase(self) -> ErasedConstructor {
        let build = self.build;
        ErasedConstructor {
            params: self.params,
            marked: self.marked,
            build: Arc::new(move |args| build(args).map(|c| erase(Arc::new(c)))),
        }
    }
}

impl<C> fmt::Debug for Constructor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .field("marked", &self.marked)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct ErasedConstructor {
    pub(crate) params: Vec<Dependency>,
    pub(crate) marked: bool,
    build: BuildFn,
}

impl ErasedConstructor {
    pub(crate) fn invoke(&self, args: &mut ResolvedArgs) -> Result<AnyHandle> {
        (self.build)(args)
    }
}

impl fmt::Debug for ErasedConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedConstructor")
            .field("params", &self.params)
            .field("marked", &self.marked)
            .finish()
    }
}

/// A live instance paired with the injection point it satisfies.
#[derive(Clone)]
pub struct ResolvedDependency {
    pub dependency: Dependency,
    pub(crate) instance: AnyHandle,
}

impl ResolvedDependency {
    /// The instance as `T`, if that is the type it was resolved as.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instance.downcast_ref::<Arc<T>>().cloned()
    }
}

impl fmt::Debug for ResolvedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedDependency")
            .field("dependency", &self.dependency)
            .finish_non_exhaustive()
    }
}

/// Resolved constructor arguments, consumed in declaration order.
#[derive(Debug)]
pub struct ResolvedArgs {
    identity: DefinitionId,
    values: Vec<ResolvedDependency>,
    cursor: usize,
}

impl ResolvedArgs {
    pub(crate) fn new(identity: DefinitionId, values: Vec<ResolvedDependency>) -> Self {
        Self {
            identity,
            values,
            cursor: 0,
        }
    }

    /// Identity of the definition being constructed.
    pub fn identity(&self) -> &DefinitionId {
        &self.identity
    }

    /// Takes the next argument as `T`.
    ///
    /// # Errors
    /// [`WardenError::TypeMismatch`] if the argument was declared with a
    /// different type, [`WardenError::ConstructionFailed`] if the
    /// constructor asks for more arguments than it declared.
    pub fn next<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let index = self.cursor;
        self.cursor += 1;
        self.get(index)
    }

    /// Argument `index` as `T`, independent of the cursor.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        let Some(resolved) = self.values.get(index) else {
            return Err(WardenError::construction(
                &self.identity,
                format!(
                    "constructor asked for argument {} but declared only {}",
                    index + 1,
                    self.values.len()
                ),
            ));
        };
        downcast(&resolved.instance, &self.identity)
    }

    pub fn dependencies(&self) -> &[ResolvedDependency] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::TypeKey;

    trait Logger: Send + Sync {
        fn name(&self) -> &str;
    }
    struct ConsoleLogger;
    impl Logger for ConsoleLogger {
        fn name(&self) -> &str {
            "console"
        }
    }

    fn owner() -> DefinitionId {
        DefinitionId::new(TypeKey::of::<String>(), None)
    }

    fn logger_arg() -> ResolvedDependency {
        let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger);
        ResolvedDependency {
            dependency: Dependency::of::<dyn Logger>(),
            instance: erase(logger),
        }
    }

    #[test]
    fn next_consumes_in_order() {
        let count = ResolvedDependency {
            dependency: Dependency::of::<u32>(),
            instance: erase(Arc::new(3u32)),
        };
        let mut args = ResolvedArgs::new(owner(), vec![logger_arg(), count]);

        assert_eq!(args.next::<dyn Logger>().unwrap().name(), "console");
        assert_eq!(*args.next::<u32>().unwrap(), 3);
        assert!(matches!(
            args.next::<u32>(),
            Err(WardenError::ConstructionFailed { .. })
        ));
    }

    #[test]
    fn wrong_type_is_a_mismatch() {
        let args = ResolvedArgs::new(owner(), vec![logger_arg()]);
        match args.get::<ConsoleLogger>(0) {
            Err(WardenError::TypeMismatch { expected, .. }) => {
                assert!(expected.contains("ConsoleLogger"))
            }
            other => panic!("Expected TypeMismatch, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn resolved_dependency_exposes_instance() {
        let dep = logger_arg();
        assert!(dep.get::<dyn Logger>().is_some());
        assert!(dep.get::<ConsoleLogger>().is_none());
    }

    #[test]
    fn erased_constructor_builds_handle() {
        let ctor = Constructor::no_args(|| Ok(41u64 + 1)).erase();
        assert!(!ctor.marked);
        let handle = ctor.invoke(&mut ResolvedArgs::new(owner(), vec![])).unwrap();
        assert_eq!(*downcast::<u64>(&handle, &owner()).unwrap(), 42);
    }
}
