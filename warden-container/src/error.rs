//! Error types for Warden container operations.
//!
//! Warden provides detailed, actionable error messages: which type was
//! requested, who needed it, which candidates competed, where the cycle is.

use std::fmt;

use warden_support::rendering::{CandidateEntry, render_candidates, render_chain};

use crate::key::{DefinitionId, TypeKey};
use crate::phase::Phase;

/// Boxed error used at type-erased boundaries (factories, handler bodies).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Warden operations.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Requested type/qualifier has no definition.
    #[error("{}", .0)]
    Unregistered(UnregisteredDependencyError),

    /// Several candidates, no qualifier, no unique primary.
    #[error("{}", .0)]
    Ambiguous(AmbiguousDependencyError),

    /// An identity reappeared in the active resolution path.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A proxy could not be built or handed out.
    #[error("{}", .0)]
    ProxyCreation(ProxyCreationError),

    /// A handler body or pass-through call failed.
    #[error(transparent)]
    HandlerInvocation(#[from] HandlerInvocationError),

    /// A factory or constructor returned an error of its own.
    #[error("Failed to construct {identity}: {source}")]
    ConstructionFailed {
        identity: String,
        #[source]
        source: BoxError,
    },

    /// A type-erased instance did not have the expected type.
    #[error("Type mismatch while resolving {identity}: expected {expected}")]
    TypeMismatch {
        identity: String,
        expected: &'static str,
    },

    /// The operation is not allowed in the container's current phase.
    #[error("Cannot {operation} while the container is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },
}

impl WardenError {
    /// Wraps a user error raised while building `identity`.
    pub fn construction(
        identity: &DefinitionId,
        source: impl Into<BoxError>,
    ) -> Self {
        WardenError::ConstructionFailed {
            identity: identity.to_string(),
            source: source.into(),
        }
    }

    /// Records which definition required a missing dependency.
    pub(crate) fn required_by(mut self, parent: Option<&DefinitionId>) -> Self {
        if let WardenError::Unregistered(ref mut err) = self {
            if err.required_by.is_none() {
                err.required_by = parent.cloned();
            }
        }
        self
    }
}

/// Error when a dependency was never registered.
///
/// Includes helpful hints about what went wrong.
#[derive(Debug)]
pub struct UnregisteredDependencyError {
    /// The type that was requested
    pub requested: TypeKey,
    /// The qualifier that was requested, if any
    pub qualifier: Option<String>,
    /// What required this dependency (if known)
    pub required_by: Option<DefinitionId>,
    /// Similar types that ARE registered (for "did you mean?" suggestions)
    pub suggestions: Vec<String>,
}

impl fmt::Display for UnregisteredDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency not registered: {}", self.requested.short_name())?;

        if let Some(ref q) = self.qualifier {
            write!(f, " (qualifier={q:?})")?;
        }

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: register a definition exposing {}",
            self.requested.short_name()
        )
    }
}

/// Error when several definitions compete and none can be chosen.
#[derive(Debug)]
pub struct AmbiguousDependencyError {
    pub requested: TypeKey,
    pub qualifier: Option<String>,
    /// Every competing definition with its primary flag.
    pub candidates: Vec<(DefinitionId, bool)>,
}

impl AmbiguousDependencyError {
    /// Identities of all candidates, in registration order.
    pub fn candidate_ids(&self) -> impl Iterator<Item = &DefinitionId> {
        self.candidates.iter().map(|(id, _)| id)
    }
}

impl fmt::Display for AmbiguousDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ambiguous dependency: {} candidates for {}",
            self.candidates.len(),
            self.requested.short_name(),
        )?;
        if let Some(ref q) = self.qualifier {
            write!(f, " (qualifier={q:?})")?;
        }

        let entries: Vec<CandidateEntry> = self
            .candidates
            .iter()
            .map(|(id, primary)| CandidateEntry {
                identity: id.to_string(),
                primary: *primary,
            })
            .collect();
        write!(f, ":\n{}", render_candidates(&entries))?;

        write!(
            f,
            "\n  Hint: request a qualifier or flag exactly one definition as primary"
        )
    }
}

/// Error when a circular dependency is detected.
///
/// Shows the full resolution path so you can see WHERE the cycle is.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// The identities being constructed when the cycle closed.
    pub path: Vec<DefinitionId>,
    /// The identity that appeared a second time.
    pub closing: DefinitionId,
}

impl CircularDependencyError {
    /// The path followed by the closing identity: `[A, B, A]`.
    pub fn chain(&self) -> Vec<DefinitionId> {
        let mut chain = self.path.clone();
        chain.push(self.closing.clone());
        chain
    }

    /// Just the cycle, starting at the first occurrence of the closing identity.
    pub fn cycle(&self) -> &[DefinitionId] {
        let start = self
            .path
            .iter()
            .position(|id| id == &self.closing)
            .unwrap_or(0);
        &self.path[start..]
    }
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<String> = self.chain().iter().map(ToString::to_string).collect();
        write!(f, "Circular dependency detected: {}", render_chain(&chain))?;

        write!(
            f,
            "\n  Hint: break the cycle with field injection on one side"
        )
    }
}

/// Error when a proxy cannot be produced for an intercepted bean.
#[derive(Debug)]
pub struct ProxyCreationError {
    pub identity: DefinitionId,
    pub requested: TypeKey,
    pub reason: String,
}

impl fmt::Display for ProxyCreationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot proxy {} as {}: {}",
            self.identity,
            self.requested.short_name(),
            self.reason,
        )
    }
}

/// Failure raised inside a handler body or the real call of an
/// intercepted method, annotated with where it happened.
///
/// Interceptable interfaces convert it into their own error type,
/// so it reaches the caller like any other call failure.
#[derive(Debug, thiserror::Error)]
#[error("{declaring}::{method} failed: {source}")]
pub struct HandlerInvocationError {
    /// Name of the interface declaring the method.
    pub declaring: &'static str,
    /// Name of the invoked method.
    pub method: &'static str,
    #[source]
    pub source: BoxError,
}

impl HandlerInvocationError {
    pub fn new(
        declaring: &'static str,
        method: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            declaring,
            method,
            source: source.into(),
        }
    }

    /// Returns the failure kind if the dispatcher itself raised it.
    pub fn failure(&self) -> Option<&InvocationFailure> {
        self.source.downcast_ref::<InvocationFailure>()
    }
}

/// Failures raised by the dispatch machinery rather than user code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationFailure {
    #[error("handler returned a value that is not {expected}")]
    ReturnTypeMismatch { expected: &'static str },

    #[error("asynchronous call was cancelled before completing")]
    Cancelled,

    #[error("asynchronous call rejected: worker pool is shut down")]
    Rejected,
}

impl std::error::Error for UnregisteredDependencyError {}
impl std::error::Error for AmbiguousDependencyError {}
impl std::error::Error for CircularDependencyError {}
impl std::error::Error for ProxyCreationError {}

impl From<CircularDependencyError> for WardenError {
    fn from(err: CircularDependencyError) -> Self {
        WardenError::CircularDependency(err)
    }
}

/// Convenient Result type for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
