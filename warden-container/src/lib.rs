//! Core container implementation for Warden.
//!
//! A dependency-injection container with selective method interception:
//! beans are built and cached as singletons, cycles are detected per
//! resolution call, and beans matched by a method handler are handed out
//! as proxies that route their calls through the handler registry.

pub mod container;
pub mod context;
pub mod decision;
pub mod definition;
pub mod descriptor;
pub mod dispatch;
mod engine;
pub mod error;
pub mod handler;
pub mod injection;
pub mod key;
pub mod lifecycle;
pub mod path;
pub mod phase;
#[cfg(feature = "async")]
pub mod pool;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod settings;

pub use container::{Container, ContainerBuilder, prelude};
pub use error::{Result, WardenError};
pub use key::{DefinitionId, Dependency, TypeKey};
pub use phase::Phase;

/// Re-exported so downstream crates can submit providers without
/// depending on `inventory` directly.
pub use inventory;
