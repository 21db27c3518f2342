//! Lifecycle coordination: phases, extension points and shutdown.
//!
//! ```text
//! UNINITIALIZED ─► DEFINITIONS_READY ─► INSTANTIATING ─► READY ─► SHUTTING_DOWN ─► CLOSED
//!                   definitions-ready     eager beans,             pre-destroy,
//!                   extensions            context-ready            shutdown hooks
//!                                         extensions
//! ```

#[cfg(feature = "async")]
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::container::Container;
use crate::error::{BoxError, Result, WardenError};
use crate::phase::Phase;
use crate::provider::Registrar;
use crate::registry::DefinitionRegistry;

/// Runs once all static definitions are known, before anything is
/// instantiated. May add definitions (including replacements) and
/// method handlers.
pub trait DefinitionsReadyExtension: Send + Sync {
    fn on_definitions_ready(&self, registry: &DefinitionRegistry, registrar: &mut dyn Registrar) -> Result<()>;
}

impl<F> DefinitionsReadyExtension for F
where
    F: Fn(&DefinitionRegistry, &mut dyn Registrar) -> Result<()> + Send + Sync,
{
    fn on_definitions_ready(&self, registry: &DefinitionRegistry, registrar: &mut dyn Registrar) -> Result<()> {
        self(registry, registrar)
    }
}

/// Runs once eager beans exist, before the container reports READY.
pub trait ContextReadyExtension: Send + Sync {
    fn on_context_ready(&self, container: &Container) -> Result<()>;
}

impl<F> ContextReadyExtension for F
where
    F: Fn(&Container) -> Result<()> + Send + Sync,
{
    fn on_context_ready(&self, container: &Container) -> Result<()> {
        self(container)
    }
}

/// Runs at the start of shutdown, before shutdown hooks.
pub trait PreDestroyProcessor: Send + Sync {
    fn pre_destroy(&self, container: &Container) -> Result<()>;
}

impl<F> PreDestroyProcessor for F
where
    F: Fn(&Container) -> Result<()> + Send + Sync,
{
    fn pre_destroy(&self, container: &Container) -> Result<()> {
        self(container)
    }
}

/// Stops every worker pool bean: signal, wait `timeout`, abort the rest.
#[cfg(feature = "async")]
#[derive(Debug, Clone, Copy)]
pub struct ExecutorShutdown {
    pub timeout: Duration,
}

#[cfg(feature = "async")]
impl PreDestroyProcessor for ExecutorShutdown {
    fn pre_destroy(&self, container: &Container) -> Result<()> {
        for pool in container.beans_of_type::<crate::pool::WorkerPool>() {
            let report = pool.shutdown(self.timeout);
            info!(drained = report.drained, cancelled = report.cancelled, "Worker pool stopped");
        }
        Ok(())
    }
}

pub(crate) type ShutdownHook = Box<dyn FnOnce() -> std::result::Result<(), BoxError> + Send>;

/// Phase state machine plus registered shutdown hooks.
pub(crate) struct Lifecycle {
    phase: RwLock<Phase>,
    hooks: Mutex<Vec<ShutdownHook>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: RwLock::new(Phase::Uninitialized),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.read()
    }

    /// Moves to `to`, which must directly follow the current phase.
    pub(crate) fn advance(&self, to: Phase) -> Result<()> {
        let mut phase = self.phase.write();
        if phase.next() != Some(to) {
            return Err(WardenError::InvalidPhase {
                operation: "advance",
                phase: *phase,
            });
        }
        info!(from = %*phase, to = %to, "Phase transition");
        *phase = to;
        Ok(())
    }

    pub(crate) fn ensure_resolvable(&self, operation: &'static str) -> Result<()> {
        let phase = self.phase();
        if phase.allows_resolution() {
            Ok(())
        } else {
            Err(WardenError::InvalidPhase { operation, phase })
        }
    }

    pub(crate) fn ensure_open(&self, operation: &'static str) -> Result<()> {
        let phase = self.phase();
        if phase.is_terminating() {
            Err(WardenError::InvalidPhase { operation, phase })
        } else {
            Ok(())
        }
    }

    pub(crate) fn add_hook(&self, hook: ShutdownHook) -> Result<()> {
        self.ensure_open("register a shutdown hook")?;
        self.hooks.lock().push(hook);
        Ok(())
    }

    pub(crate) fn take_hooks(&self) -> Vec<ShutdownHook> {
        std::mem::take(&mut *self.hooks.lock())
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("phase", &self.phase())
            .field("hooks", &self.hooks.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_one_step_at_a_time() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.phase(), Phase::Uninitialized);

        lifecycle.advance(Phase::DefinitionsReady).unwrap();
        match lifecycle.advance(Phase::Ready) {
            Err(WardenError::InvalidPhase { phase, .. }) => assert_eq!(phase, Phase::DefinitionsReady),
            other => panic!("Expected InvalidPhase, got: {other:?}"),
        }
        assert!(lifecycle.advance(Phase::Uninitialized).is_err());
    }

    #[test]
    fn resolution_only_in_window() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.ensure_resolvable("resolve").is_err());
        lifecycle.advance(Phase::DefinitionsReady).unwrap();
        lifecycle.advance(Phase::Instantiating).unwrap();
        assert!(lifecycle.ensure_resolvable("resolve").is_ok());
    }

    #[test]
    fn hooks_rejected_once_terminating() {
        let lifecycle = Lifecycle::new();
        for phase in [
            Phase::DefinitionsReady,
            Phase::Instantiating,
            Phase::Ready,
        ] {
            lifecycle.advance(phase).unwrap();
        }
        lifecycle.add_hook(Box::new(|| Ok(()))).unwrap();
        lifecycle.advance(Phase::ShuttingDown).unwrap();

        assert!(lifecycle.add_hook(Box::new(|| Ok(()))).is_err());
        assert_eq!(lifecycle.take_hooks().len(), 1);
        assert!(lifecycle.take_hooks().is_empty());
    }
}
