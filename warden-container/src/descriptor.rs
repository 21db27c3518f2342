//! Static metadata describing interceptable interfaces.
//!
//! Rust cannot enumerate the methods of a trait at runtime, so every
//! interceptable interface describes itself once with a static
//! [`TypeDescriptor`] listing its methods and markers.
//!
//! ```
//! use warden_container::descriptor::{Marker, MethodDescriptor, TypeDescriptor};
//!
//! pub const AUDITED: Marker = Marker::new("audited");
//!
//! pub const DEPOSIT: MethodDescriptor = MethodDescriptor::new("deposit").marked(&[AUDITED]);
//! pub const BALANCE: MethodDescriptor = MethodDescriptor::new("balance");
//!
//! pub static ACCOUNT: TypeDescriptor = TypeDescriptor::new("Account", &[DEPOSIT, BALANCE]);
//!
//! assert!(ACCOUNT.method("deposit").unwrap().has_marker(AUDITED));
//! assert!(!ACCOUNT.has_marker(AUDITED));
//! ```

use std::fmt;

use crate::key::{DefinitionId, TypeKey};

/// A declarative tag attached to a type or method, used only for matching.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker(&'static str);

impl Marker {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Describes one method of an interceptable interface.
#[derive(Debug, Clone, Copy)]
pub struct MethodDescriptor {
    name: &'static str,
    markers: &'static [Marker],
    asynchronous: bool,
}

impl MethodDescriptor {
    /// The generic "describe this object" method, answered by every proxy
    /// without consulting any handler.
    pub const DESCRIBE: MethodDescriptor = MethodDescriptor::new("describe");

    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            markers: &[],
            asynchronous: false,
        }
    }

    /// Attaches markers to the method.
    pub const fn marked(mut self, markers: &'static [Marker]) -> Self {
        self.markers = markers;
        self
    }

    /// Declares the method asynchronous: proxies never run it on the
    /// calling thread.
    pub const fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn markers(&self) -> &'static [Marker] {
        self.markers
    }

    #[inline]
    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    pub(crate) fn is_describe(&self) -> bool {
        self.name == Self::DESCRIBE.name && self.markers.is_empty() && !self.asynchronous
    }
}

/// Describes an interceptable interface: its name, class-level markers
/// and methods.
#[derive(Debug)]
pub struct TypeDescriptor {
    name: &'static str,
    markers: &'static [Marker],
    methods: &'static [MethodDescriptor],
}

impl TypeDescriptor {
    pub const fn new(name: &'static str, methods: &'static [MethodDescriptor]) -> Self {
        Self {
            name,
            markers: &[],
            methods,
        }
    }

    /// Attaches class-level markers to the interface.
    pub const fn marked(mut self, markers: &'static [Marker]) -> Self {
        self.markers = markers;
        self
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn methods(&self) -> &'static [MethodDescriptor] {
        self.methods
    }

    pub fn method(&self, name: &str) -> Option<&'static MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }
}

/// Runtime facts about the instance behind a proxy, used for matching.
///
/// Built from the bean's definition: its identity, every type it is
/// assignable to, and the class-level markers of its concrete type.
#[derive(Debug, Clone)]
pub struct ReceiverInfo {
    pub identity: DefinitionId,
    pub assignable: Vec<TypeKey>,
    pub markers: Vec<Marker>,
}

impl ReceiverInfo {
    /// `true` if the receiver is its concrete type or exposes `key`.
    pub fn is_instance_of(&self, key: &TypeKey) -> bool {
        self.identity.concrete() == *key || self.assignable.contains(key)
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    /// Whether the declaring type of a method carries `marker`: either the
    /// interface declares it or the receiver's concrete type does.
    pub fn declares(&self, declaring: &TypeDescriptor, marker: Marker) -> bool {
        declaring.has_marker(marker) || self.has_marker(marker)
    }
}
