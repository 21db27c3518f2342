//! Definition registry: stores every construction recipe of a container.
//!
//! Definitions are kept in registration order. Re-registering an identity
//! replaces the definition in place, so iteration order stays stable.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};
use warden_support::rendering::suggest_similar;

use crate::definition::Definition;
use crate::error::{AmbiguousDependencyError, Result, UnregisteredDependencyError, WardenError};
use crate::key::{DefinitionId, TypeKey};

const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Default)]
struct Entries {
    ordered: Vec<Arc<Definition>>,
    index: HashMap<DefinitionId, usize>,
}

/// Stores all definitions of one container.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    entries: RwLock<Entries>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a definition, replacing any definition with the same identity.
    pub fn register(&self, definition: Definition) -> Arc<Definition> {
        let definition = Arc::new(definition);
        let id = definition.id().clone();
        let mut entries = self.entries.write();

        match entries.index.get(&id).copied() {
            Some(slot) => {
                debug!(identity = %id, "Replaced definition");
                entries.ordered[slot] = definition.clone();
            }
            None => {
                debug!(identity = %id, requested = %definition.requested(), "Registered definition");
                let slot = entries.ordered.len();
                entries.ordered.push(definition.clone());
                entries.index.insert(id, slot);
            }
        }
        definition
    }

    pub fn get(&self, id: &DefinitionId) -> Option<Arc<Definition>> {
        let entries = self.entries.read();
        entries.index.get(id).map(|&slot| entries.ordered[slot].clone())
    }

    /// Every definition assignable to `key`, in registration order.
    pub fn definitions(&self, key: &TypeKey) -> Vec<Arc<Definition>> {
        self.entries
            .read()
            .ordered
            .iter()
            .filter(|d| d.is_assignable_to(key))
            .cloned()
            .collect()
    }

    /// The single definition to use for `key` and `qualifier`.
    ///
    /// # Errors
    /// - [`WardenError::Unregistered`] if no candidate matches.
    /// - [`WardenError::Ambiguous`] if several match and neither a
    ///   qualifier nor a unique primary definition decides.
    pub fn definition(&self, key: &TypeKey, qualifier: Option<&str>) -> Result<Arc<Definition>> {
        let mut candidates = self.definitions(key);
        if let Some(q) = qualifier {
            candidates.retain(|d| d.qualifier() == Some(q));
        }
        trace!(key = %key, ?qualifier, candidates = candidates.len(), "Definition lookup");

        match candidates.len() {
            0 => Err(self.unregistered(key, qualifier)),
            1 => Ok(candidates.remove(0)),
            _ if qualifier.is_some() => Err(ambiguous(key, qualifier, &candidates)),
            _ => {
                let mut primaries = candidates.iter().filter(|d| d.is_primary());
                match (primaries.next(), primaries.next()) {
                    (Some(primary), None) => Ok(primary.clone()),
                    _ => Err(ambiguous(key, qualifier, &candidates)),
                }
            }
        }
    }

    /// Snapshot of every definition, in registration order.
    pub fn all(&self) -> Vec<Arc<Definition>> {
        self.entries.read().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().ordered.is_empty()
    }

    fn unregistered(&self, key: &TypeKey, qualifier: Option<&str>) -> WardenError {
        let names: Vec<String> = {
            let entries = self.entries.read();
            let mut names: Vec<String> = entries
                .ordered
                .iter()
                .flat_map(|d| std::iter::once(d.concrete()).chain(d.exposes()))
                .map(|k| k.short_name())
                .collect();
            names.sort();
            names.dedup();
            names
        };
        let available: Vec<&str> = names.iter().map(String::as_str).collect();

        WardenError::Unregistered(UnregisteredDependencyError {
            requested: *key,
            qualifier: qualifier.map(str::to_owned),
            required_by: None,
            suggestions: suggest_similar(&key.short_name(), &available, MAX_SUGGESTIONS),
        })
    }
}

fn ambiguous(key: &TypeKey, qualifier: Option<&str>, candidates: &[Arc<Definition>]) -> WardenError {
    warn!(key = %key, candidates = candidates.len(), "Ambiguous dependency");
    WardenError::Ambiguous(AmbiguousDependencyError {
        requested: *key,
        qualifier: qualifier.map(str::to_owned),
        candidates: candidates
            .iter()
            .map(|d| (d.id().clone(), d.is_primary()))
            .collect(),
    })
}
