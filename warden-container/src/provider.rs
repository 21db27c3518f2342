//! Provider trait: a module of related registrations.
//!
//! Providers group definitions and method handlers by concern. They can
//! be added to a builder explicitly, or submitted to a link-time table
//! with `inventory` and collected by
//! [`ContainerBuilder::with_submitted_providers`](crate::container::ContainerBuilder::with_submitted_providers).
//!
//! # Examples
//! ```
//! use warden_container::definition::Definition;
//! use warden_container::provider::{Provider, ProviderEntry, Registrar};
//!
//! #[derive(Default)]
//! struct Clock;
//!
//! struct ClockProvider;
//!
//! impl Provider for ClockProvider {
//!     fn register(&self, registrar: &mut dyn Registrar) {
//!         registrar.register_definition(Definition::of::<Clock>().default_constructor().build());
//!     }
//! }
//!
//! inventory::submit! {
//!     ProviderEntry { name: "clock", provider: &ClockProvider }
//! }
//! ```

use crate::definition::Definition;
use crate::handler::MethodHandlerRegistration;

/// A module that registers related definitions and handlers.
pub trait Provider: Send + Sync {
    /// Called once while the container is assembled.
    fn register(&self, registrar: &mut dyn Registrar);

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// What providers and definitions-ready extensions register into.
pub trait Registrar {
    fn register_definition(&mut self, definition: Definition);

    fn register_method_handler(&mut self, registration: MethodHandlerRegistration);
}

/// Entry of the link-time provider table.
pub struct ProviderEntry {
    /// Unique name, used for ordering and logs.
    pub name: &'static str,
    pub provider: &'static dyn Provider,
}

inventory::collect!(ProviderEntry);

/// Every submitted provider, sorted by name so the order does not depend
/// on link order.
pub fn submitted_providers() -> Vec<&'static ProviderEntry> {
    let mut entries: Vec<&'static ProviderEntry> = inventory::iter::<ProviderEntry>.into_iter().collect();
    entries.sort_by_key(|e| e.name);
    entries
}

/// Registrations collected into plain lists, applied to a container later.
#[derive(Debug, Default)]
pub struct PendingRegistrations {
    pub definitions: Vec<Definition>,
    pub handlers: Vec<MethodHandlerRegistration>,
}

impl Registrar for PendingRegistrations {
    fn register_definition(&mut self, definition: Definition) {
        self.definitions.push(definition);
    }

    fn register_method_handler(&mut self, registration: MethodHandlerRegistration) {
        self.handlers.push(registration);
    }
}
