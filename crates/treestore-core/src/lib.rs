//! # treestore-core
//!
//! The consistency core of TreeStore - THE LOGIC.
//!
//! TreeStore keeps items in a single-rooted category tree. Categories carry
//! facets (named sets of typed property definitions) that their descendants
//! inherit; entities live in one category, carry tags that contribute more
//! facets, and hold typed values for their effective properties;
//! relationships connect two entities and get their schema from tags only.
//!
//! ## What the core guarantees
//!
//! - One root category, created exactly once even under concurrent access
//! - Sibling names unique case-insensitively, enforced at the store write
//! - No stale values: whenever an item's effective schema shrinks, values
//!   of properties that left it are purged
//! - Entities referenced by a relationship cannot be deleted
//!
//! ## Architectural Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - Storage behind repository traits; in-memory and redb collaborators
//! - Deterministic iteration: `BTreeMap` tables and insertion-ordered facets

// =============================================================================
// MODULES
// =============================================================================

pub mod category;
pub mod entity;
pub mod facet;
pub mod primitives;
pub mod relationship;
pub mod repository;
pub mod session;
pub mod storage;
pub mod tag;
pub mod traversal;
pub mod types;
pub mod values;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CategoryId, EntityId, FacetId, FacetPropertyId, Identified, ItemKind, ItemRef, Named,
    RelationshipId, TagId, TreeStoreError,
};

// =============================================================================
// RE-EXPORTS: Model
// =============================================================================

pub use category::Category;
pub use entity::Entity;
pub use facet::{
    Facet, FacetProperty, FacetPropertyType, addressed_properties, resolve_property,
};
pub use relationship::Relationship;
pub use tag::Tag;
pub use values::{AddressedValue, FacetValue, PropertyValues, ValueHolder, addressed_values};

// =============================================================================
// RE-EXPORTS: Storage & Use Cases
// =============================================================================

pub use repository::{
    CategoryRepository, EntityRepository, RelationshipRepository, Store, TagRepository,
};
pub use session::{Session, SessionMetrics, StorageBackend};
pub use storage::{MemoryStore, RedbStore};
pub use traversal::{CategoryCopyTraverser, CategoryRemovalTraverser, Subtree, collect_subtree};
