//! # In-Memory Store
//!
//! `BTreeMap` tables behind a single `RwLock`. Every write takes the write
//! lock once, so each `upsert` checks and updates the uniqueness indexes
//! atomically. Iteration order is deterministic (identifier order).

use super::{EntityRecord, RelationshipRecord, ensure_tags_exist, key_available};
use crate::category::Category;
use crate::entity::Entity;
use crate::primitives::unique_key;
use crate::relationship::Relationship;
use crate::repository::{
    CategoryRepository, EntityRepository, RelationshipRepository, Store, TagRepository,
};
use crate::tag::Tag;
use crate::types::{CategoryId, EntityId, ItemKind, Named, RelationshipId, TagId};
use crate::TreeStoreError;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    categories: BTreeMap<CategoryId, Category>,
    category_names: BTreeMap<String, CategoryId>,
    root: Option<CategoryId>,
    entities: BTreeMap<EntityId, EntityRecord>,
    entity_names: BTreeMap<String, EntityId>,
    tags: BTreeMap<TagId, Tag>,
    tag_names: BTreeMap<String, TagId>,
    relationships: BTreeMap<RelationshipId, RelationshipRecord>,
}

impl Tables {
    fn entity(&self, record: &EntityRecord) -> Result<Entity, TreeStoreError> {
        record
            .clone()
            .into_entity(|id| Ok(self.tags.get(&id).cloned()))
    }

    fn relationship(&self, record: &RelationshipRecord) -> Result<Relationship, TreeStoreError> {
        record
            .clone()
            .into_relationship(|id| Ok(self.tags.get(&id).cloned()))
    }
}

type Shared = Arc<RwLock<Tables>>;

fn read(tables: &Shared) -> Result<RwLockReadGuard<'_, Tables>, TreeStoreError> {
    tables
        .read()
        .map_err(|_| TreeStoreError::StorageError("memory store lock poisoned".to_string()))
}

fn write(tables: &Shared) -> Result<RwLockWriteGuard<'_, Tables>, TreeStoreError> {
    tables
        .write()
        .map_err(|_| TreeStoreError::StorageError("memory store lock poisoned".to_string()))
}

// =============================================================================
// STORE
// =============================================================================

/// Ephemeral store holding all four repositories over shared tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    categories: MemoryCategories,
    entities: MemoryEntities,
    tags: MemoryTags,
    relationships: MemoryRelationships,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let tables: Shared = Arc::new(RwLock::new(Tables::default()));
        Self {
            categories: MemoryCategories(Arc::clone(&tables)),
            entities: MemoryEntities(Arc::clone(&tables)),
            tags: MemoryTags(Arc::clone(&tables)),
            relationships: MemoryRelationships(tables),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn categories(&self) -> &dyn CategoryRepository {
        &self.categories
    }

    fn entities(&self) -> &dyn EntityRepository {
        &self.entities
    }

    fn tags(&self) -> &dyn TagRepository {
        &self.tags
    }

    fn relationships(&self) -> &dyn RelationshipRepository {
        &self.relationships
    }
}

// =============================================================================
// CATEGORIES
// =============================================================================

#[derive(Debug, Clone)]
struct MemoryCategories(Shared);

impl CategoryRepository for MemoryCategories {
    fn upsert(&self, category: Category) -> Result<Category, TreeStoreError> {
        let mut tables = write(&self.0)?;
        let key = category.unique_name();

        if !key_available(tables.category_names.get(&key).copied(), category.id()) {
            return Err(TreeStoreError::DuplicateName {
                kind: ItemKind::Category,
                name: category.name().to_string(),
            });
        }

        match category.parent() {
            None if !key_available(tables.root, category.id()) => {
                return Err(TreeStoreError::MissingParent(category.name().to_string()));
            }
            Some(parent)
                if parent == category.id() || !tables.categories.contains_key(&parent) =>
            {
                return Err(TreeStoreError::MissingParent(category.name().to_string()));
            }
            _ => {}
        }

        let previous_key = tables
            .categories
            .get(&category.id())
            .map(Category::unique_name);
        if let Some(previous_key) = previous_key {
            tables.category_names.remove(&previous_key);
        }
        if category.is_root() {
            tables.root = Some(category.id());
        }
        tables.category_names.insert(key, category.id());
        tables.categories.insert(category.id(), category.clone());
        Ok(category)
    }

    fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, TreeStoreError> {
        Ok(read(&self.0)?.categories.get(&id).cloned())
    }

    fn find_all(&self) -> Result<Vec<Category>, TreeStoreError> {
        Ok(read(&self.0)?.categories.values().cloned().collect())
    }

    fn delete(&self, category: &Category) -> Result<bool, TreeStoreError> {
        let mut tables = write(&self.0)?;
        if tables.root == Some(category.id()) {
            return Err(TreeStoreError::RootProtected);
        }
        match tables.categories.remove(&category.id()) {
            Some(stored) => {
                tables.category_names.remove(&stored.unique_name());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find_by_parent(&self, parent: &Category) -> Result<Vec<Category>, TreeStoreError> {
        Ok(read(&self.0)?
            .categories
            .values()
            .filter(|c| c.parent() == Some(parent.id()))
            .cloned()
            .collect())
    }

    fn find_by_parent_and_name(
        &self,
        parent: &Category,
        name: &str,
    ) -> Result<Option<Category>, TreeStoreError> {
        let tables = read(&self.0)?;
        let key = unique_key(name, Some(parent.id()));
        Ok(tables
            .category_names
            .get(&key)
            .and_then(|id| tables.categories.get(id))
            .cloned())
    }

    fn find_root(&self) -> Result<Option<Category>, TreeStoreError> {
        let tables = read(&self.0)?;
        Ok(tables
            .root
            .and_then(|id| tables.categories.get(&id))
            .cloned())
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

#[derive(Debug, Clone)]
struct MemoryEntities(Shared);

impl EntityRepository for MemoryEntities {
    fn upsert(&self, entity: Entity) -> Result<Entity, TreeStoreError> {
        let mut tables = write(&self.0)?;

        let Some(key) = entity
            .unique_name()
            .filter(|_| entity.category().is_some_and(|c| tables.categories.contains_key(&c)))
        else {
            return Err(TreeStoreError::OrphanItem(entity.name().to_string()));
        };

        if !key_available(tables.entity_names.get(&key).copied(), entity.id()) {
            return Err(TreeStoreError::DuplicateName {
                kind: ItemKind::Entity,
                name: entity.name().to_string(),
            });
        }
        ensure_tags_exist(&entity, entity.tags(), |id| Ok(tables.tags.contains_key(&id)))?;

        let record = EntityRecord::from_entity(&entity);
        if let Some(previous) = tables.entities.insert(entity.id(), record) {
            let previous_key = unique_key(&previous.name, previous.category);
            if previous_key != key {
                tables.entity_names.remove(&previous_key);
            }
        }
        tables.entity_names.insert(key, entity.id());
        Ok(entity)
    }

    fn find_by_id(&self, id: EntityId) -> Result<Option<Entity>, TreeStoreError> {
        let tables = read(&self.0)?;
        tables
            .entities
            .get(&id)
            .map(|record| tables.entity(record))
            .transpose()
    }

    fn find_all(&self) -> Result<Vec<Entity>, TreeStoreError> {
        let tables = read(&self.0)?;
        tables
            .entities
            .values()
            .map(|record| tables.entity(record))
            .collect()
    }

    fn delete(&self, entity: &Entity) -> Result<bool, TreeStoreError> {
        let mut tables = write(&self.0)?;
        if tables
            .relationships
            .values()
            .any(|r| r.touches(entity.id()))
        {
            tracing::debug!(entity = %entity.id(), "Refusing to delete referenced entity");
            return Ok(false);
        }
        match tables.entities.remove(&entity.id()) {
            Some(record) => {
                let key = unique_key(&record.name, record.category);
                tables.entity_names.remove(&key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find_by_category(&self, category: &Category) -> Result<Vec<Entity>, TreeStoreError> {
        let tables = read(&self.0)?;
        tables
            .entities
            .values()
            .filter(|r| r.category == Some(category.id()))
            .map(|record| tables.entity(record))
            .collect()
    }

    fn find_by_category_and_name(
        &self,
        category: &Category,
        name: &str,
    ) -> Result<Option<Entity>, TreeStoreError> {
        let tables = read(&self.0)?;
        let key = unique_key(name, Some(category.id()));
        tables
            .entity_names
            .get(&key)
            .and_then(|id| tables.entities.get(id))
            .map(|record| tables.entity(record))
            .transpose()
    }

    fn find_by_tag(&self, tag: &Tag) -> Result<Vec<Entity>, TreeStoreError> {
        let tables = read(&self.0)?;
        tables
            .entities
            .values()
            .filter(|r| r.tags.contains(&tag.id()))
            .map(|record| tables.entity(record))
            .collect()
    }

    fn is_referenced(&self, entity: &Entity) -> Result<bool, TreeStoreError> {
        Ok(read(&self.0)?
            .relationships
            .values()
            .any(|r| r.touches(entity.id())))
    }
}

// =============================================================================
// TAGS
// =============================================================================

#[derive(Debug, Clone)]
struct MemoryTags(Shared);

impl TagRepository for MemoryTags {
    fn upsert(&self, tag: Tag) -> Result<Tag, TreeStoreError> {
        let mut tables = write(&self.0)?;
        let key = tag.unique_name();

        if !key_available(tables.tag_names.get(&key).copied(), tag.id()) {
            return Err(TreeStoreError::DuplicateName {
                kind: ItemKind::Tag,
                name: tag.name().to_string(),
            });
        }

        if let Some(previous) = tables.tags.insert(tag.id(), tag.clone()) {
            tables.tag_names.remove(&previous.unique_name());
        }
        tables.tag_names.insert(key, tag.id());
        Ok(tag)
    }

    fn find_by_id(&self, id: TagId) -> Result<Option<Tag>, TreeStoreError> {
        Ok(read(&self.0)?.tags.get(&id).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Tag>, TreeStoreError> {
        let tables = read(&self.0)?;
        Ok(tables
            .tag_names
            .get(&name.to_lowercase())
            .and_then(|id| tables.tags.get(id))
            .cloned())
    }

    fn find_all(&self) -> Result<Vec<Tag>, TreeStoreError> {
        Ok(read(&self.0)?.tags.values().cloned().collect())
    }

    fn delete(&self, tag: &Tag) -> Result<bool, TreeStoreError> {
        let mut tables = write(&self.0)?;
        let in_use = tables.entities.values().any(|r| r.tags.contains(&tag.id()))
            || tables
                .relationships
                .values()
                .any(|r| r.tags.contains(&tag.id()));
        if in_use {
            tracing::debug!(tag = %tag.id(), "Refusing to delete tag in use");
            return Ok(false);
        }
        match tables.tags.remove(&tag.id()) {
            Some(stored) => {
                tables.tag_names.remove(&stored.unique_name());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

#[derive(Debug, Clone)]
struct MemoryRelationships(Shared);

impl RelationshipRepository for MemoryRelationships {
    fn upsert(&self, relationship: Relationship) -> Result<Relationship, TreeStoreError> {
        let mut tables = write(&self.0)?;

        for endpoint in [relationship.from_entity(), relationship.to_entity()]
            .into_iter()
            .flatten()
        {
            if !tables.entities.contains_key(&endpoint) {
                return Err(TreeStoreError::not_found(
                    ItemKind::Entity,
                    endpoint.as_uuid(),
                ));
            }
        }
        ensure_tags_exist(&relationship, relationship.tags(), |id| {
            Ok(tables.tags.contains_key(&id))
        })?;

        tables.relationships.insert(
            relationship.id(),
            RelationshipRecord::from_relationship(&relationship),
        );
        Ok(relationship)
    }

    fn find_by_id(&self, id: RelationshipId) -> Result<Option<Relationship>, TreeStoreError> {
        let tables = read(&self.0)?;
        tables
            .relationships
            .get(&id)
            .map(|record| tables.relationship(record))
            .transpose()
    }

    fn find_all(&self) -> Result<Vec<Relationship>, TreeStoreError> {
        let tables = read(&self.0)?;
        tables
            .relationships
            .values()
            .map(|record| tables.relationship(record))
            .collect()
    }

    fn delete(&self, relationship: &Relationship) -> Result<bool, TreeStoreError> {
        Ok(write(&self.0)?
            .relationships
            .remove(&relationship.id())
            .is_some())
    }

    fn find_by_entity(&self, entity: &Entity) -> Result<Vec<Relationship>, TreeStoreError> {
        let tables = read(&self.0)?;
        tables
            .relationships
            .values()
            .filter(|r| r.touches(entity.id()))
            .map(|record| tables.relationship(record))
            .collect()
    }

    fn find_by_tag(&self, tag: &Tag) -> Result<Vec<Relationship>, TreeStoreError> {
        let tables = read(&self.0)?;
        tables
            .relationships
            .values()
            .filter(|r| r.tags.contains(&tag.id()))
            .map(|record| tables.relationship(record))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn child_of(parent: &Category, name: &str) -> Category {
        let mut child = Category::new(name);
        parent.add_sub_category(&mut child);
        child
    }

    fn entity_in(category: &Category, name: &str, store: &MemoryStore) -> Entity {
        let mut entity = Entity::new(name);
        entity
            .set_category(category, store.categories())
            .expect("categorize");
        entity
    }

    #[test]
    fn root_is_created_once() {
        let store = MemoryStore::new();
        let first = store.categories().root().expect("root");
        let second = store.categories().root().expect("root");
        assert_eq!(first, second);
        assert_eq!(store.categories().find_all().expect("all").len(), 1);
    }

    #[test]
    fn concurrent_root_creation_yields_one_root() {
        let store = MemoryStore::new();
        let roots: Vec<Category> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| store.categories().root().expect("root")))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("join"))
                .collect()
        });

        assert!(roots.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.categories().find_all().expect("all").len(), 1);
    }

    #[test]
    fn second_parentless_category_is_rejected() {
        let store = MemoryStore::new();
        store.categories().root().expect("root");

        let result = store.categories().upsert(Category::new("loose"));
        assert!(matches!(result, Err(TreeStoreError::MissingParent(_))));
    }

    #[test]
    fn sibling_names_are_unique_case_insensitively() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        store
            .categories()
            .upsert(child_of(&root, "Docs"))
            .expect("docs");

        let result = store.categories().upsert(child_of(&root, "docs"));
        assert!(matches!(result, Err(TreeStoreError::DuplicateName { .. })));
    }

    #[test]
    fn renaming_frees_the_old_key() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let mut docs = store
            .categories()
            .upsert(child_of(&root, "docs"))
            .expect("docs");

        docs.set_name("guides");
        store.categories().upsert(docs).expect("rename");
        store
            .categories()
            .upsert(child_of(&root, "docs"))
            .expect("old name is free again");
        assert!(
            store
                .categories()
                .find_by_parent_and_name(&root, "GUIDES")
                .expect("find")
                .is_some()
        );
    }

    #[test]
    fn root_cannot_be_deleted() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        assert!(matches!(
            store.categories().delete(&root),
            Err(TreeStoreError::RootProtected)
        ));
    }

    #[test]
    fn orphan_entity_is_rejected() {
        let store = MemoryStore::new();
        let result = store.entities().upsert(Entity::new("loose"));
        assert!(matches!(result, Err(TreeStoreError::OrphanItem(_))));
    }

    #[test]
    fn referenced_entity_delete_is_refused() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let a = store
            .entities()
            .upsert(entity_in(&root, "a", &store))
            .expect("a");
        let b = store
            .entities()
            .upsert(entity_in(&root, "b", &store))
            .expect("b");
        let rel = store
            .relationships()
            .upsert(Relationship::between("cites", &a, &b))
            .expect("rel");

        assert!(store.entities().is_referenced(&b).expect("referenced"));
        assert!(!store.entities().delete(&b).expect("delete"));

        assert!(store.relationships().delete(&rel).expect("delete rel"));
        assert!(store.entities().delete(&b).expect("delete"));
        assert!(!store.entities().delete(&b).expect("delete again"));
    }

    #[test]
    fn reads_resolve_current_tags() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let mut tag = store.tags().upsert(Tag::new("book")).expect("tag");

        let mut entity = entity_in(&root, "readme", &store);
        entity.add_tag(tag.clone());
        let entity = store.entities().upsert(entity).expect("entity");

        tag.set_name("novel");
        store.tags().upsert(tag.clone()).expect("rename");

        let loaded = store
            .entities()
            .find_by_id(entity.id())
            .expect("find")
            .expect("exists");
        assert_eq!(loaded.tags()[0].name(), "novel");
        assert_eq!(store.entities().find_by_tag(&tag).expect("by tag").len(), 1);
        assert!(!store.tags().delete(&tag).expect("tag in use"));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let mut entity = entity_in(&root, "readme", &store);
        entity.add_tag(Tag::new("unsaved"));

        let result = store.entities().upsert(entity);
        assert!(matches!(
            result,
            Err(TreeStoreError::NotFound {
                kind: ItemKind::Tag,
                ..
            })
        ));
    }

    #[test]
    fn relationship_endpoints_must_exist() {
        let store = MemoryStore::new();
        let result = store.relationships().upsert(Relationship::between(
            "cites",
            &Entity::new("a"),
            &Entity::new("b"),
        ));
        assert!(matches!(
            result,
            Err(TreeStoreError::NotFound {
                kind: ItemKind::Entity,
                ..
            })
        ));
    }
}
