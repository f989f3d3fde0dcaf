//! # Repository Contracts
//!
//! The storage-agnostic operations the core depends on. The core never
//! implements storage itself; it talks to these traits, and the `storage`
//! module provides two collaborators (in-memory and redb).
//!
//! ## Contract
//!
//! - Every read returns a fresh copy. No identity-preserving caching is
//!   assumed across repository boundaries.
//! - `upsert` enforces the uniqueness keys (`Category::unique_name`,
//!   `Entity::unique_name`, tag names) atomically at that single write and
//!   fails with `DuplicateName` on collision.
//! - There are no multi-call transactions.
//! - All methods take `&self`: stores use interior mutability so several
//!   repositories can be held at once by the traversers.

use crate::category::Category;
use crate::entity::Entity;
use crate::relationship::Relationship;
use crate::tag::Tag;
use crate::types::{CategoryId, EntityId, RelationshipId, TagId};
use crate::TreeStoreError;

// =============================================================================
// CATEGORY REPOSITORY
// =============================================================================

/// Persistence of the category tree.
pub trait CategoryRepository: Send + Sync {
    /// Insert or update a category.
    ///
    /// Fails with `DuplicateName` if a sibling shares the uniqueness key, and
    /// with `MissingParent` if a non-root category has no (existing) parent.
    fn upsert(&self, category: Category) -> Result<Category, TreeStoreError>;

    fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, TreeStoreError>;

    fn find_all(&self) -> Result<Vec<Category>, TreeStoreError>;

    /// Delete a category. Returns `false` if it did not exist.
    ///
    /// Deleting the root fails with `RootProtected`. Sub-categories and
    /// entities are not checked here: that is the traversers' job.
    fn delete(&self, category: &Category) -> Result<bool, TreeStoreError>;

    /// Direct sub-categories of `parent`.
    fn find_by_parent(&self, parent: &Category) -> Result<Vec<Category>, TreeStoreError>;

    /// The direct sub-category of `parent` named `name` (case-insensitive).
    fn find_by_parent_and_name(
        &self,
        parent: &Category,
        name: &str,
    ) -> Result<Option<Category>, TreeStoreError>;

    /// The parentless category, if it has been created.
    fn find_root(&self) -> Result<Option<Category>, TreeStoreError>;

    /// Get or create the root category.
    ///
    /// Idempotent under concurrent first access: when two callers race to
    /// create the root, the loser's write fails on the unique index and it
    /// re-reads the winner's root.
    fn root(&self) -> Result<Category, TreeStoreError> {
        if let Some(root) = self.find_root()? {
            return Ok(root);
        }

        match self.upsert(Category::new_root()) {
            Ok(root) => {
                tracing::info!(root = %root.id(), "Created root category");
                Ok(root)
            }
            Err(TreeStoreError::DuplicateName { .. }) => {
                tracing::warn!("Lost root creation race, re-reading root category");
                self.find_root()?.ok_or_else(|| {
                    TreeStoreError::InvalidTree("root category missing after creation race".into())
                })
            }
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// ENTITY REPOSITORY
// =============================================================================

/// Persistence of entities.
pub trait EntityRepository: Send + Sync {
    /// Insert or update an entity.
    ///
    /// Fails with `OrphanItem` if the entity has no (existing) category and
    /// with `DuplicateName` if the category already holds an entity with the
    /// same case-insensitive name.
    fn upsert(&self, entity: Entity) -> Result<Entity, TreeStoreError>;

    fn find_by_id(&self, id: EntityId) -> Result<Option<Entity>, TreeStoreError>;

    fn find_all(&self) -> Result<Vec<Entity>, TreeStoreError>;

    /// Delete an entity.
    ///
    /// Returns `false` (refusal, not an error) if the entity does not exist
    /// or is still referenced by a relationship.
    fn delete(&self, entity: &Entity) -> Result<bool, TreeStoreError>;

    fn find_by_category(&self, category: &Category) -> Result<Vec<Entity>, TreeStoreError>;

    fn find_by_category_and_name(
        &self,
        category: &Category,
        name: &str,
    ) -> Result<Option<Entity>, TreeStoreError>;

    fn find_by_tag(&self, tag: &Tag) -> Result<Vec<Entity>, TreeStoreError>;

    /// Whether any relationship points at the entity.
    fn is_referenced(&self, entity: &Entity) -> Result<bool, TreeStoreError>;
}

// =============================================================================
// TAG REPOSITORY
// =============================================================================

/// Persistence of tags.
pub trait TagRepository: Send + Sync {
    /// Insert or update a tag. Tag names are unique case-insensitively.
    fn upsert(&self, tag: Tag) -> Result<Tag, TreeStoreError>;

    fn find_by_id(&self, id: TagId) -> Result<Option<Tag>, TreeStoreError>;

    fn find_by_name(&self, name: &str) -> Result<Option<Tag>, TreeStoreError>;

    fn find_all(&self) -> Result<Vec<Tag>, TreeStoreError>;

    /// Delete a tag. Returns `false` if it does not exist or is still
    /// attached to an entity or relationship.
    fn delete(&self, tag: &Tag) -> Result<bool, TreeStoreError>;
}

// =============================================================================
// RELATIONSHIP REPOSITORY
// =============================================================================

/// Persistence of relationships.
pub trait RelationshipRepository: Send + Sync {
    /// Insert or update a relationship. Both endpoints, when set, must exist.
    fn upsert(&self, relationship: Relationship) -> Result<Relationship, TreeStoreError>;

    fn find_by_id(&self, id: RelationshipId) -> Result<Option<Relationship>, TreeStoreError>;

    fn find_all(&self) -> Result<Vec<Relationship>, TreeStoreError>;

    fn delete(&self, relationship: &Relationship) -> Result<bool, TreeStoreError>;

    /// Relationships whose `from` or `to` is `entity`.
    fn find_by_entity(&self, entity: &Entity) -> Result<Vec<Relationship>, TreeStoreError>;

    fn find_by_tag(&self, tag: &Tag) -> Result<Vec<Relationship>, TreeStoreError>;
}

// =============================================================================
// STORE
// =============================================================================

/// A storage collaborator exposing the four repositories over one database.
pub trait Store: Send + Sync {
    fn categories(&self) -> &dyn CategoryRepository;

    fn entities(&self) -> &dyn EntityRepository;

    fn tags(&self) -> &dyn TagRepository;

    fn relationships(&self) -> &dyn RelationshipRepository;
}
