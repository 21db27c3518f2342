//! Container lifecycle phases.
//!
//! A container moves through its phases strictly forward:
//!
//! ```text
//! Uninitialized → DefinitionsReady → Instantiating → Ready → ShuttingDown → Closed
//! ```
//!
//! # Ordering
//! Phases have a natural ordering following the sequence above, so
//! `Phase::Ready > Phase::Instantiating`.
use std::fmt;

/// Where a container is in its lifetime.
///
/// # Examples
/// ```
/// use warden_container::phase::Phase;
///
/// assert!(Phase::Ready > Phase::DefinitionsReady);
/// assert_eq!(Phase::Instantiating.next(), Some(Phase::Ready));
/// assert_eq!(Phase::Closed.next(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Definitions are still being collected.
    Uninitialized,

    /// All static definitions are collected; definitions-ready
    /// extensions may add more. Nothing is instantiated yet.
    DefinitionsReady,

    /// Eager beans are being resolved and context-ready
    /// extensions are running.
    Instantiating,

    /// Fully started. Beans are resolved lazily on demand.
    Ready,

    /// Pre-destroy processors and shutdown hooks are running.
    ShuttingDown,

    /// Terminal. No further resolution is permitted.
    Closed,
}

impl Phase {
    /// Returns the phase that legally follows this one.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Uninitialized => Some(Phase::DefinitionsReady),
            Phase::DefinitionsReady => Some(Phase::Instantiating),
            Phase::Instantiating => Some(Phase::Ready),
            Phase::Ready => Some(Phase::ShuttingDown),
            Phase::ShuttingDown => Some(Phase::Closed),
            Phase::Closed => None,
        }
    }

    /// Returns `true` if beans may be resolved in this phase.
    #[inline]
    pub fn allows_resolution(&self) -> bool {
        matches!(self, Phase::Instantiating | Phase::Ready | Phase::ShuttingDown)
    }

    /// Returns `true` once the container has started shutting down.
    #[inline]
    pub fn is_terminating(&self) -> bool {
        matches!(self, Phase::ShuttingDown | Phase::Closed)
    }

    #[inline]
    fn ordering(&self) -> u8 {
        match self {
            Phase::Uninitialized => 0,
            Phase::DefinitionsReady => 1,
            Phase::Instantiating => 2,
            Phase::Ready => 3,
            Phase::ShuttingDown => 4,
            Phase::Closed => 5,
        }
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordering().cmp(&other.ordering())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Uninitialized => write!(f, "UNINITIALIZED"),
            Phase::DefinitionsReady => write!(f, "DEFINITIONS_READY"),
            Phase::Instantiating => write!(f, "INSTANTIATING"),
            Phase::Ready => write!(f, "READY"),
            Phase::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            Phase::Closed => write!(f, "CLOSED"),
        }
    }
}
