//! # Session Module
//!
//! The use-case layer the adapters talk to. A `Session` owns one storage
//! backend and keeps the invariants of the model across repository
//! boundaries: names are validated, value maps are purged whenever the
//! effective schema of an item shrinks, and recursive work goes through the
//! traversers.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryStore` (fast, volatile)
//! - `Persistent`: `RedbStore` (disk-backed ACID storage)
//!
//! All methods take `&self`; the stores synchronize internally.

use crate::category::Category;
use crate::entity::Entity;
use crate::facet::{Facet, FacetProperty, FacetPropertyType, resolve_property};
use crate::primitives::{PATH_SEPARATOR, validate_depth, validate_name};
use crate::relationship::Relationship;
use crate::repository::{
    CategoryRepository, EntityRepository, RelationshipRepository, Store, TagRepository,
};
use crate::storage::{MemoryStore, RedbStore};
use crate::tag::Tag;
use crate::traversal::{CategoryCopyTraverser, CategoryRemovalTraverser, collect_subtree};
use crate::types::{
    CategoryId, EntityId, FacetPropertyId, ItemKind, Named, RelationshipId, TagId,
};
use crate::values::{AddressedValue, FacetValue, ValueHolder, addressed_values};
use crate::TreeStoreError;
use serde::Serialize;
use std::path::Path;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for a Session.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// In-memory tables (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed tables using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl Store for StorageBackend {
    fn categories(&self) -> &dyn CategoryRepository {
        match self {
            Self::InMemory(store) => store.categories(),
            Self::Persistent(store) => store.categories(),
        }
    }

    fn entities(&self) -> &dyn EntityRepository {
        match self {
            Self::InMemory(store) => store.entities(),
            Self::Persistent(store) => store.entities(),
        }
    }

    fn tags(&self) -> &dyn TagRepository {
        match self {
            Self::InMemory(store) => store.tags(),
            Self::Persistent(store) => store.tags(),
        }
    }

    fn relationships(&self) -> &dyn RelationshipRepository {
        match self {
            Self::InMemory(store) => store.relationships(),
            Self::Persistent(store) => store.relationships(),
        }
    }
}

/// Item counts of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionMetrics {
    pub categories: usize,
    pub entities: usize,
    pub tags: usize,
    pub relationships: usize,
}

// =============================================================================
// SESSION
// =============================================================================

/// A session over one store.
#[derive(Debug, Clone, Default)]
pub struct Session {
    backend: StorageBackend,
}

impl Session {
    /// Create a new empty session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, TreeStoreError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbStore::open(path)?),
        })
    }

    /// Whether this session is using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Direct access to the repositories.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        &self.backend
    }

    fn categories(&self) -> &dyn CategoryRepository {
        self.backend.categories()
    }

    fn entities(&self) -> &dyn EntityRepository {
        self.backend.entities()
    }

    fn tags(&self) -> &dyn TagRepository {
        self.backend.tags()
    }

    fn relationships(&self) -> &dyn RelationshipRepository {
        self.backend.relationships()
    }

    // =========================================================================
    // CATEGORIES
    // =========================================================================

    /// The root category, created on first access.
    pub fn root(&self) -> Result<Category, TreeStoreError> {
        self.categories().root()
    }

    pub fn category(&self, id: CategoryId) -> Result<Category, TreeStoreError> {
        self.categories()
            .find_by_id(id)?
            .ok_or_else(|| TreeStoreError::not_found(ItemKind::Category, id.as_uuid()))
    }

    /// Create a category named `name` under `parent`.
    ///
    /// Fails with `TreeTooDeep` if `parent` is at `MAX_TREE_DEPTH`.
    pub fn create_category(
        &self,
        parent: CategoryId,
        name: &str,
    ) -> Result<Category, TreeStoreError> {
        validate_name(name)?;
        let parent = self.category(parent)?;
        validate_depth(name, parent.depth(self.categories())? + 1)?;
        let mut category = Category::new(name);
        parent.add_sub_category(&mut category);
        self.categories().upsert(category)
    }

    pub fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category, TreeStoreError> {
        self.update_category(id, Some(name), None)
    }

    /// Re-parent a category.
    ///
    /// Every entity below the moved category loses the values of facets it
    /// no longer inherits.
    pub fn move_category(
        &self,
        id: CategoryId,
        new_parent: CategoryId,
    ) -> Result<Category, TreeStoreError> {
        self.update_category(id, None, Some(new_parent))
    }

    /// Rename and/or re-parent a category in a single write.
    ///
    /// Every check (root protection, name, cycle, depth) runs before the
    /// write; the sibling name collision is caught by the write itself. A
    /// failed update leaves the category unchanged.
    pub fn update_category(
        &self,
        id: CategoryId,
        name: Option<&str>,
        new_parent: Option<CategoryId>,
    ) -> Result<Category, TreeStoreError> {
        let mut category = self.category(id)?;
        if category.is_root() {
            return Err(TreeStoreError::RootProtected);
        }
        if let Some(name) = name {
            validate_name(name)?;
        }

        let target = match new_parent {
            Some(parent) => {
                let target = self.category(parent)?;
                if target.is_within(&category, self.categories())? {
                    return Err(TreeStoreError::SubtreeCycle(category.name().to_string()));
                }
                let height = collect_subtree(self.categories(), self.entities(), &category)?.height;
                validate_depth(
                    category.name(),
                    target.depth(self.categories())? + 1 + height,
                )?;
                Some(target)
            }
            None => None,
        };

        if let Some(name) = name {
            category.set_name(name);
            category.facet_mut().set_name(name);
        }
        if let Some(target) = &target {
            target.add_sub_category(&mut category);
        }
        let category = self.categories().upsert(category)?;

        if let Some(target) = target {
            let purged = self.purge_subtree(&category)?;
            tracing::info!(category = %category.id(), parent = %target.id(), purged, "Moved category");
        }
        Ok(category)
    }

    /// Resolve a slash-separated path (`docs/guides`) from the root.
    ///
    /// The empty path and `/` resolve to the root. Names match
    /// case-insensitively.
    pub fn resolve_path(&self, path: &str) -> Result<Category, TreeStoreError> {
        let mut current = self.root()?;
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            current = self
                .categories()
                .find_by_parent_and_name(&current, segment)?
                .ok_or_else(|| TreeStoreError::PathNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Resolve `category/path/entity-name` to an entity.
    pub fn resolve_entity_path(&self, path: &str) -> Result<Entity, TreeStoreError> {
        let trimmed = path.trim_matches(PATH_SEPARATOR);
        let (category_path, name) = trimmed
            .rsplit_once(PATH_SEPARATOR)
            .unwrap_or(("", trimmed));
        if name.is_empty() {
            return Err(TreeStoreError::MissingArgument("entity name"));
        }
        let category = self.resolve_path(category_path)?;
        self.entities()
            .find_by_category_and_name(&category, name)?
            .ok_or_else(|| TreeStoreError::PathNotFound(path.to_string()))
    }

    /// Absolute path of a category, `/` for the root.
    pub fn category_path(&self, category: &Category) -> Result<String, TreeStoreError> {
        if category.is_root() {
            return Ok(PATH_SEPARATOR.to_string());
        }
        let ancestors = category.ancestors(self.categories())?;
        let mut path = String::new();
        for ancestor in ancestors.iter().rev().filter(|a| !a.is_root()) {
            path.push(PATH_SEPARATOR);
            path.push_str(ancestor.name());
        }
        path.push(PATH_SEPARATOR);
        path.push_str(category.name());
        Ok(path)
    }

    /// Direct sub-categories.
    pub fn children(&self, category: &Category) -> Result<Vec<Category>, TreeStoreError> {
        self.categories().find_by_parent(category)
    }

    /// Entities placed directly in a category.
    pub fn category_entities(&self, category: &Category) -> Result<Vec<Entity>, TreeStoreError> {
        self.entities().find_by_category(category)
    }

    /// Copy `src` under `dst`, with its subtree if `recursive`.
    pub fn copy_category(
        &self,
        src: CategoryId,
        dst: CategoryId,
        recursive: bool,
    ) -> Result<Category, TreeStoreError> {
        let src = self.category(src)?;
        let dst = self.category(dst)?;
        let traverser = CategoryCopyTraverser::new(self.categories(), self.entities());
        if recursive {
            traverser.copy_category_recursively(&src, &dst)
        } else {
            traverser.copy_category(&src, &dst)
        }
    }

    /// Delete a category, with its subtree if `recursive`.
    ///
    /// Returns `false` when the deletion is refused (root, or non-empty
    /// category without `recursive`).
    pub fn delete_category(&self, id: CategoryId, recursive: bool) -> Result<bool, TreeStoreError> {
        let category = self.category(id)?;
        let traverser = CategoryRemovalTraverser::new(self.categories(), self.entities());
        if recursive {
            traverser.delete_recursively(&category)
        } else {
            traverser.delete_if_empty(&category)
        }
    }

    pub fn add_category_property(
        &self,
        id: CategoryId,
        name: &str,
        property_type: FacetPropertyType,
    ) -> Result<FacetProperty, TreeStoreError> {
        validate_name(name)?;
        let mut category = self.category(id)?;
        let property = FacetProperty::new(name, property_type);
        category.facet_mut().add_property(property.clone())?;
        self.categories().upsert(category)?;
        Ok(property)
    }

    /// Remove a property from a category's facet and purge its values from
    /// every entity of the subtree. Removing an absent property is a no-op.
    pub fn remove_category_property(
        &self,
        id: CategoryId,
        property: FacetPropertyId,
    ) -> Result<bool, TreeStoreError> {
        let mut category = self.category(id)?;
        if category.facet_mut().remove_property(property).is_none() {
            return Ok(false);
        }
        let category = self.categories().upsert(category)?;
        let purged = self.purge_subtree(&category)?;

        tracing::debug!(category = %category.id(), %property, purged, "Removed category property");
        Ok(true)
    }

    /// Effective facets of a category: own first, root last.
    pub fn category_facets(&self, id: CategoryId) -> Result<Vec<Facet>, TreeStoreError> {
        self.category(id)?.effective_facets(self.categories())
    }

    /// Re-purge every entity below `category`. Returns the purged count.
    fn purge_subtree(&self, category: &Category) -> Result<usize, TreeStoreError> {
        let subtree = collect_subtree(self.categories(), self.entities(), category)?;
        let mut purged = 0;
        for mut entity in subtree.entities {
            let count = entity.purge_with(self.categories())?;
            if count > 0 {
                self.entities().upsert(entity)?;
                purged += count;
            }
        }
        Ok(purged)
    }

    // =========================================================================
    // TAGS
    // =========================================================================

    pub fn tag(&self, id: TagId) -> Result<Tag, TreeStoreError> {
        self.tags()
            .find_by_id(id)?
            .ok_or_else(|| TreeStoreError::not_found(ItemKind::Tag, id.as_uuid()))
    }

    /// Look a tag up by name (case-insensitive).
    pub fn find_tag(&self, name: &str) -> Result<Option<Tag>, TreeStoreError> {
        self.tags().find_by_name(name)
    }

    pub fn all_tags(&self) -> Result<Vec<Tag>, TreeStoreError> {
        self.tags().find_all()
    }

    pub fn create_tag(&self, name: &str) -> Result<Tag, TreeStoreError> {
        validate_name(name)?;
        self.tags().upsert(Tag::new(name))
    }

    pub fn rename_tag(&self, id: TagId, name: &str) -> Result<Tag, TreeStoreError> {
        validate_name(name)?;
        let mut tag = self.tag(id)?;
        tag.set_name(name);
        tag.facet_mut().set_name(name);
        self.tags().upsert(tag)
    }

    pub fn add_tag_property(
        &self,
        id: TagId,
        name: &str,
        property_type: FacetPropertyType,
    ) -> Result<FacetProperty, TreeStoreError> {
        validate_name(name)?;
        let mut tag = self.tag(id)?;
        let property = FacetProperty::new(name, property_type);
        tag.facet_mut().add_property(property.clone())?;
        self.tags().upsert(tag)?;
        Ok(property)
    }

    /// Remove a property from a tag's facet and purge its values from every
    /// entity and relationship carrying the tag.
    pub fn remove_tag_property(
        &self,
        id: TagId,
        property: FacetPropertyId,
    ) -> Result<bool, TreeStoreError> {
        let mut tag = self.tag(id)?;
        if tag.facet_mut().remove_property(property).is_none() {
            return Ok(false);
        }
        let tag = self.tags().upsert(tag)?;

        let mut purged = 0;
        for mut entity in self.entities().find_by_tag(&tag)? {
            let count = entity.purge_with(self.categories())?;
            if count > 0 {
                self.entities().upsert(entity)?;
                purged += count;
            }
        }
        for mut relationship in self.relationships().find_by_tag(&tag)? {
            let facets = relationship.effective_facets();
            let count = relationship.purge_stale_values(&facets);
            if count > 0 {
                self.relationships().upsert(relationship)?;
                purged += count;
            }
        }

        tracing::debug!(tag = %tag.id(), %property, purged, "Removed tag property");
        Ok(true)
    }

    /// Delete a tag.
    ///
    /// Without `force` the deletion is refused (`false`) while the tag is
    /// attached anywhere. With `force` it is first detached from every
    /// entity and relationship, purging the values it contributed.
    pub fn delete_tag(&self, id: TagId, force: bool) -> Result<bool, TreeStoreError> {
        let tag = self.tag(id)?;
        if force {
            for mut entity in self.entities().find_by_tag(&tag)? {
                entity.remove_tag(&tag, self.categories())?;
                self.entities().upsert(entity)?;
            }
            for mut relationship in self.relationships().find_by_tag(&tag)? {
                relationship.remove_tag(&tag);
                self.relationships().upsert(relationship)?;
            }
        }

        let deleted = self.tags().delete(&tag)?;
        if !deleted {
            tracing::warn!(tag = %tag.id(), "Tag is still in use");
        }
        Ok(deleted)
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    pub fn entity(&self, id: EntityId) -> Result<Entity, TreeStoreError> {
        self.entities()
            .find_by_id(id)?
            .ok_or_else(|| TreeStoreError::not_found(ItemKind::Entity, id.as_uuid()))
    }

    pub fn create_entity(&self, category: CategoryId, name: &str) -> Result<Entity, TreeStoreError> {
        validate_name(name)?;
        let category = self.category(category)?;
        let mut entity = Entity::new(name);
        entity.set_category(&category, self.categories())?;
        self.entities().upsert(entity)
    }

    pub fn rename_entity(&self, id: EntityId, name: &str) -> Result<Entity, TreeStoreError> {
        validate_name(name)?;
        let mut entity = self.entity(id)?;
        entity.set_name(name);
        self.entities().upsert(entity)
    }

    /// Move an entity to another category, purging values that are not
    /// effective there.
    pub fn move_entity(&self, id: EntityId, category: CategoryId) -> Result<Entity, TreeStoreError> {
        let mut entity = self.entity(id)?;
        let category = self.category(category)?;
        entity.set_category(&category, self.categories())?;
        self.entities().upsert(entity)
    }

    /// Copy an entity (fresh identity, same tags and values) into a category.
    pub fn copy_entity(&self, id: EntityId, category: CategoryId) -> Result<Entity, TreeStoreError> {
        let entity = self.entity(id)?;
        let category = self.category(category)?;
        let mut copy = entity.clone_entity();
        copy.set_category(&category, self.categories())?;
        self.entities().upsert(copy)
    }

    /// Delete an entity. Returns `false` while a relationship references it.
    pub fn delete_entity(&self, id: EntityId) -> Result<bool, TreeStoreError> {
        let entity = self.entity(id)?;
        let deleted = self.entities().delete(&entity)?;
        if !deleted {
            tracing::warn!(entity = %entity.id(), "Entity is referenced by a relationship");
        }
        Ok(deleted)
    }

    pub fn assign_tag(&self, id: EntityId, tag: TagId) -> Result<Entity, TreeStoreError> {
        let mut entity = self.entity(id)?;
        let tag = self.tag(tag)?;
        if entity.add_tag(tag) {
            return self.entities().upsert(entity);
        }
        Ok(entity)
    }

    pub fn unassign_tag(&self, id: EntityId, tag: TagId) -> Result<Entity, TreeStoreError> {
        let mut entity = self.entity(id)?;
        let tag = self.tag(tag)?;
        if entity.remove_tag(&tag, self.categories())? {
            return self.entities().upsert(entity);
        }
        Ok(entity)
    }

    /// The effective property of an entity addressed by `key` (bare name,
    /// `facet/name` or property id).
    pub fn entity_property(&self, id: EntityId, key: &str) -> Result<FacetProperty, TreeStoreError> {
        let entity = self.entity(id)?;
        resolve_property(&entity.effective_facets(self.categories())?, key)
    }

    /// Set a value, resolving the property by key among the entity's
    /// effective properties.
    pub fn set_entity_value(
        &self,
        id: EntityId,
        property: &str,
        value: FacetValue,
    ) -> Result<Entity, TreeStoreError> {
        self.update_entity_values(id, vec![(property.to_string(), Some(value))])
    }

    pub fn clear_entity_value(&self, id: EntityId, property: &str) -> Result<Entity, TreeStoreError> {
        self.update_entity_values(id, vec![(property.to_string(), None)])
    }

    /// Apply value changes by property key (`None` clears) in a single
    /// write. Nothing is written if any key or value is rejected.
    pub fn update_entity_values(
        &self,
        id: EntityId,
        changes: Vec<(String, Option<FacetValue>)>,
    ) -> Result<Entity, TreeStoreError> {
        let mut entity = self.entity(id)?;
        let facets = entity.effective_facets(self.categories())?;
        let mut changed = false;
        for (key, change) in changes {
            let property = resolve_property(&facets, &key)?;
            match change {
                Some(value) => {
                    entity.set_facet_property(&property, value)?;
                    changed = true;
                }
                None => changed |= entity.clear_facet_property(&property).is_some(),
            }
        }
        if changed {
            return self.entities().upsert(entity);
        }
        Ok(entity)
    }

    /// Values of an entity with their property keys, in effective property
    /// order.
    pub fn entity_values(&self, id: EntityId) -> Result<Vec<AddressedValue>, TreeStoreError> {
        let entity = self.entity(id)?;
        let facets = entity.effective_facets(self.categories())?;
        Ok(addressed_values(&entity, &facets))
    }

    // =========================================================================
    // RELATIONSHIPS
    // =========================================================================

    pub fn relationship(&self, id: RelationshipId) -> Result<Relationship, TreeStoreError> {
        self.relationships()
            .find_by_id(id)?
            .ok_or_else(|| TreeStoreError::not_found(ItemKind::Relationship, id.as_uuid()))
    }

    pub fn all_relationships(&self) -> Result<Vec<Relationship>, TreeStoreError> {
        self.relationships().find_all()
    }

    pub fn create_relationship(
        &self,
        name: &str,
        from: EntityId,
        to: EntityId,
    ) -> Result<Relationship, TreeStoreError> {
        validate_name(name)?;
        let from = self.entity(from)?;
        let to = self.entity(to)?;
        self.relationships()
            .upsert(Relationship::between(name, &from, &to))
    }

    pub fn delete_relationship(&self, id: RelationshipId) -> Result<bool, TreeStoreError> {
        let relationship = self.relationship(id)?;
        self.relationships().delete(&relationship)
    }

    /// Relationships whose `from` or `to` is the entity.
    pub fn relationships_of(&self, id: EntityId) -> Result<Vec<Relationship>, TreeStoreError> {
        let entity = self.entity(id)?;
        self.relationships().find_by_entity(&entity)
    }

    pub fn assign_relationship_tag(
        &self,
        id: RelationshipId,
        tag: TagId,
    ) -> Result<Relationship, TreeStoreError> {
        let mut relationship = self.relationship(id)?;
        let tag = self.tag(tag)?;
        if relationship.add_tag(tag) {
            return self.relationships().upsert(relationship);
        }
        Ok(relationship)
    }

    /// The effective property of a relationship addressed by `key`.
    pub fn relationship_property(
        &self,
        id: RelationshipId,
        key: &str,
    ) -> Result<FacetProperty, TreeStoreError> {
        resolve_property(&self.relationship(id)?.effective_facets(), key)
    }

    pub fn set_relationship_value(
        &self,
        id: RelationshipId,
        property: &str,
        value: FacetValue,
    ) -> Result<Relationship, TreeStoreError> {
        self.update_relationship_values(id, vec![(property.to_string(), value)])
    }

    /// Set several relationship values by property key in a single write.
    /// Nothing is written if any key or value is rejected.
    pub fn update_relationship_values(
        &self,
        id: RelationshipId,
        changes: Vec<(String, FacetValue)>,
    ) -> Result<Relationship, TreeStoreError> {
        let mut relationship = self.relationship(id)?;
        let facets = relationship.effective_facets();
        for (key, value) in changes {
            let property = resolve_property(&facets, &key)?;
            relationship.set_facet_property(&property, value)?;
        }
        self.relationships().upsert(relationship)
    }

    // =========================================================================
    // METRICS
    // =========================================================================

    /// Count the items of every kind.
    pub fn metrics(&self) -> Result<SessionMetrics, TreeStoreError> {
        Ok(SessionMetrics {
            categories: self.categories().find_all()?.len(),
            entities: self.entities().find_all()?.len(),
            tags: self.tags().find_all()?.len(),
            relationships: self.relationships().find_all()?.len(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
