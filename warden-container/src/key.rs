//! Type and definition identification keys.
//!
//! [`TypeKey`] identifies a Rust type (sized or `dyn Trait`).
//! [`DefinitionId`] identifies one definition in the registry:
//! its concrete type plus an optional qualifier.
//! [`Dependency`] is an injection point declared by a constructor.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use warden_support::rendering::shorten_type_name;

/// Identifies a type known to the container.
///
/// # Examples
/// ```
/// use warden_container::key::TypeKey;
///
/// let key = TypeKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(key.short_name(), "String");
/// ```
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeKey {
    /// Creates a key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] of this type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name without module paths.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.type_name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Identity of a definition: `concrete type + "@" + qualifier`.
///
/// The qualifier part is omitted when absent or empty.
///
/// ```
/// use warden_container::key::{DefinitionId, TypeKey};
///
/// struct CardPayment;
///
/// let id = DefinitionId::new(TypeKey::of::<CardPayment>(), Some("card"));
/// assert_eq!(id.to_string(), "CardPayment@card");
///
/// let id = DefinitionId::new(TypeKey::of::<CardPayment>(), None);
/// assert_eq!(id.to_string(), "CardPayment");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DefinitionId {
    concrete: TypeKey,
    qualifier: Option<String>,
}

impl DefinitionId {
    pub fn new(concrete: TypeKey, qualifier: Option<&str>) -> Self {
        Self {
            concrete,
            qualifier: qualifier.filter(|q| !q.is_empty()).map(str::to_owned),
        }
    }

    #[inline]
    pub fn concrete(&self) -> TypeKey {
        self.concrete
    }

    #[inline]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

impl fmt::Debug for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefinitionId({self})")
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}@{}", self.concrete.short_name(), q),
            None => f.write_str(&self.concrete.short_name()),
        }
    }
}

/// An injection point: a requested type and an optional qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub key: TypeKey,
    pub qualifier: Option<String>,
}

impl Dependency {
    /// Depends on the single (or primary) definition of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            qualifier: None,
        }
    }

    /// Depends on the definition of `T` registered with `qualifier`.
    pub fn named<T: ?Sized + 'static>(qualifier: &str) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            qualifier: Some(qualifier.to_owned()),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{} (qualifier={q:?})", self.key.short_name()),
            None => f.write_str(&self.key.short_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MyStruct;

    #[test]
    fn key_of_type() {
        let key = TypeKey::of::<MyStruct>();
        assert!(key.type_name().contains("MyStruct"));
        assert_eq!(key.short_name(), "MyStruct");
    }

    #[test]
    fn key_equality_same_type() {
        assert_eq!(TypeKey::of::<String>(), TypeKey::of::<String>());
        assert_ne!(TypeKey::of::<String>(), TypeKey::of::<i32>());
    }

    #[test]
    fn unsized_type_key() {
        trait MyTrait {}
        let key = TypeKey::of::<dyn MyTrait>();
        assert_eq!(key.short_name(), "dyn MyTrait");
    }

    #[test]
    fn empty_qualifier_is_dropped() {
        let a = DefinitionId::new(TypeKey::of::<MyStruct>(), Some(""));
        let b = DefinitionId::new(TypeKey::of::<MyStruct>(), None);
        assert_eq!(a, b);
        assert_eq!(a.qualifier(), None);
    }

    #[test]
    fn qualified_ids_differ() {
        let a = DefinitionId::new(TypeKey::of::<MyStruct>(), Some("a"));
        let b = DefinitionId::new(TypeKey::of::<MyStruct>(), Some("b"));
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "MyStruct@a");
    }

    #[test]
    fn id_in_hashmap() {
        let mut map = HashMap::new();
        map.insert(DefinitionId::new(TypeKey::of::<String>(), None), "string");
        map.insert(DefinitionId::new(TypeKey::of::<String>(), Some("x")), "named");
        assert_eq!(
            map.get(&DefinitionId::new(TypeKey::of::<String>(), Some("x"))),
            Some(&"named")
        );
        assert_eq!(map.get(&DefinitionId::new(TypeKey::of::<i32>(), None)), None);
    }
}
