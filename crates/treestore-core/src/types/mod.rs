//! # Core Type Definitions
//!
//! This module contains the identity layer shared by every item kind:
//! - Strongly typed identifiers (`CategoryId`, `EntityId`, `TagId`, ...)
//! - Item kinds and (kind, identity) references (`ItemKind`, `ItemRef`)
//! - The `Identified` and `Named` traits
//! - Error types (`TreeStoreError`)
//!
//! ## Identity Guarantees
//!
//! - Identifiers are UUID v7, generated once at creation and never changed
//! - Two items are equal iff they have the same kind and the same identity;
//!   mutable fields such as the name never take part in equality or hashing

use crate::facet::FacetPropertyType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new identifier with the current timestamp.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Returns the identifier as a 128-bit integer (storage key form).
            #[must_use]
            pub const fn as_u128(&self) -> u128 {
                self.0.as_u128()
            }

            /// Rebuilds an identifier from its storage key form.
            #[must_use]
            pub const fn from_u128(value: u128) -> Self {
                Self(Uuid::from_u128(value))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(
    /// Identifier of a node in the category tree.
    CategoryId
);
define_id!(
    /// Identifier of an entity (leaf item placed in a category).
    EntityId
);
define_id!(
    /// Identifier of a reusable tag.
    TagId
);
define_id!(
    /// Identifier of a directed edge between two entities.
    RelationshipId
);
define_id!(
    /// Identifier of a facet (a named set of property definitions).
    FacetId
);
define_id!(
    /// Identifier of a single property definition. Values are keyed by it.
    FacetPropertyId
);

// =============================================================================
// ITEM KINDS
// =============================================================================

/// The concrete kind of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Category,
    Entity,
    Tag,
    Relationship,
    Facet,
    FacetProperty,
}

impl ItemKind {
    /// Human readable name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Entity => "entity",
            Self::Tag => "tag",
            Self::Relationship => "relationship",
            Self::Facet => "facet",
            Self::FacetProperty => "facet property",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A (kind, identity) pair.
///
/// This is the whole of an item's equality: two references are equal iff
/// they point at the same kind of item with the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub id: Uuid,
}

impl ItemRef {
    #[must_use]
    pub const fn new(kind: ItemKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

// =============================================================================
// IDENTITY & NAMING TRAITS
// =============================================================================

/// An item with a stable identity and a concrete kind.
pub trait Identified {
    /// The identity assigned at creation.
    fn identity(&self) -> Uuid;

    /// The concrete kind of the item.
    fn kind(&self) -> ItemKind;

    /// The (kind, identity) pair used for equality.
    fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.kind(), self.identity())
    }
}

/// An identified item with a mutable name.
pub trait Named: Identified {
    fn name(&self) -> &str;

    fn set_name(&mut self, name: impl Into<String>);
}

/// Implements `PartialEq`, `Eq` and `Hash` from `Identified` only.
macro_rules! identity_equality {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                $crate::types::Identified::item_ref(self)
                    == $crate::types::Identified::item_ref(other)
            }
        }

        impl Eq for $ty {}

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                $crate::types::Identified::item_ref(self).hash(state);
            }
        }
    };
}

pub(crate) use identity_equality;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in TreeStore.
///
/// Structural invariant violations fail fast and are surfaced to the
/// immediate caller. Nothing is retried automatically.
#[derive(Debug, Error)]
pub enum TreeStoreError {
    /// A category or entity write collides with a sibling's uniqueness key.
    #[error("Duplicate name: a {kind} named '{name}' already exists here")]
    DuplicateName { kind: ItemKind, name: String },

    /// A category was persisted without a (valid) parent.
    #[error("Category '{0}' has no parent")]
    MissingParent(String),

    /// An entity was persisted without a (valid) category.
    #[error("Entity '{0}' does not belong to a category")]
    OrphanItem(String),

    /// A value does not match the declared type of its property.
    #[error("Property '{name}' expects a value of type {expected}")]
    PropertyTypeMismatch {
        name: String,
        expected: FacetPropertyType,
    },

    /// A facet already holds a property with this name.
    #[error("Duplicate property name: '{0}'")]
    DuplicatePropertyName(String),

    /// An entity cannot be removed while a relationship references it.
    #[error("Entity '{0}' is still referenced by a relationship")]
    ReferencedByRelationship(String),

    /// The root category can be neither deleted nor renamed.
    #[error("The root category is protected")]
    RootProtected,

    /// A required argument was not supplied.
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    /// The requested item does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: ItemKind, id: Uuid },

    /// Nothing exists at this slash-separated path (or tag name).
    #[error("Nothing found at '{0}'")]
    PathNotFound(String),

    /// No effective property of the item has this name.
    #[error("Unknown property: '{0}'")]
    UnknownProperty(String),

    /// More than one effective property answers to this name; qualify it
    /// as `facet/name` or use the property id.
    #[error("Ambiguous property: '{0}' (qualify it as facet/name or use its id)")]
    AmbiguousProperty(String),

    /// A name is empty, too long or contains a path separator.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// A category would end up inside its own subtree.
    #[error("Category '{0}' cannot be placed inside its own subtree")]
    SubtreeCycle(String),

    /// A write would place a category below `MAX_TREE_DEPTH`.
    #[error("Category '{name}' would lie {depth} levels deep (maximum {max})", max = crate::primitives::MAX_TREE_DEPTH)]
    TreeTooDeep { name: String, depth: usize },

    /// The stored category tree is malformed (dangling or looping parents).
    #[error("Invalid category tree: {0}")]
    InvalidTree(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The storage engine reported an error.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The configuration could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TreeStoreError {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(kind: ItemKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    /// Whether the error is a uniqueness collision.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. } | Self::DuplicatePropertyName(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
