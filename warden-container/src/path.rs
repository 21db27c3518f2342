//! The resolution path: identities currently under construction.
//!
//! One path exists per resolution call and travels inside its
//! [`ResolveContext`](crate::context::ResolveContext), so concurrent
//! resolutions never see each other's entries.

use tracing::warn;

use crate::error::CircularDependencyError;
use crate::key::DefinitionId;

/// Ordered stack of identities being constructed.
#[derive(Debug, Default, Clone)]
pub struct ResolutionPath {
    stack: Vec<DefinitionId>,
}

impl ResolutionPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `id`, failing if it is already being constructed.
    ///
    /// # Errors
    /// [`CircularDependencyError`] carrying the current path and `id`.
    pub fn enter(&mut self, id: &DefinitionId) -> Result<(), CircularDependencyError> {
        if self.contains(id) {
            let err = CircularDependencyError {
                path: self.stack.clone(),
                closing: id.clone(),
            };
            warn!(cycle = %err, "Circular dependency detected");
            return Err(err);
        }
        self.stack.push(id.clone());
        Ok(())
    }

    pub fn leave(&mut self) -> Option<DefinitionId> {
        self.stack.pop()
    }

    /// The identity being constructed right now.
    pub fn current(&self) -> Option<&DefinitionId> {
        self.stack.last()
    }

    pub fn contains(&self, id: &DefinitionId) -> bool {
        self.stack.contains(id)
    }

    pub fn as_slice(&self) -> &[DefinitionId] {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
