//! # redb-backed Storage
//!
//! A disk-backed store using the redb embedded database.
//!
//! - ACID transactions: every repository call is one write transaction, so
//!   uniqueness checks and index updates commit together or not at all
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! ## Layout
//!
//! Records are postcard-encoded and keyed by the `u128` form of their id.
//! Secondary indexes are `(head, id) -> ()` tables scanned by range, and
//! name indexes map a uniqueness key to the owning id.

mod category;
mod entity;
mod relationship;
mod tag;

use crate::repository::{
    CategoryRepository, EntityRepository, RelationshipRepository, Store, TagRepository,
};
use crate::tag::Tag;
use crate::types::TagId;
use crate::TreeStoreError;
use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Categories: id -> postcard `Category`
const CATEGORIES: TableDefinition<u128, &[u8]> = TableDefinition::new("categories");

/// Category uniqueness keys: `lower(name)_parent` -> id
const CATEGORY_NAMES: TableDefinition<&str, u128> = TableDefinition::new("category_names");

/// Tree edges: (parent id, child id)
const CATEGORY_CHILDREN: TableDefinition<(u128, u128), ()> =
    TableDefinition::new("category_children");

/// Entities: id -> postcard `EntityRecord`
const ENTITIES: TableDefinition<u128, &[u8]> = TableDefinition::new("entities");

/// Entity uniqueness keys: `lower(name)_category` -> id
const ENTITY_NAMES: TableDefinition<&str, u128> = TableDefinition::new("entity_names");

/// (category id, entity id)
const ENTITIES_BY_CATEGORY: TableDefinition<(u128, u128), ()> =
    TableDefinition::new("entities_by_category");

/// (tag id, entity id)
const ENTITIES_BY_TAG: TableDefinition<(u128, u128), ()> = TableDefinition::new("entities_by_tag");

/// Tags: id -> postcard `Tag`
const TAGS: TableDefinition<u128, &[u8]> = TableDefinition::new("tags");

/// Tag uniqueness keys: `lower(name)` -> id
const TAG_NAMES: TableDefinition<&str, u128> = TableDefinition::new("tag_names");

/// Relationships: id -> postcard `RelationshipRecord`
const RELATIONSHIPS: TableDefinition<u128, &[u8]> = TableDefinition::new("relationships");

/// (entity id, relationship id) for both endpoints
const RELATIONSHIPS_BY_ENTITY: TableDefinition<(u128, u128), ()> =
    TableDefinition::new("relationships_by_entity");

/// (tag id, relationship id)
const RELATIONSHIPS_BY_TAG: TableDefinition<(u128, u128), ()> =
    TableDefinition::new("relationships_by_tag");

/// Metadata: key string -> id
const METADATA: TableDefinition<&str, u128> = TableDefinition::new("metadata");

/// Metadata key of the root category id.
const ROOT_KEY: &str = "root_category";

// =============================================================================
// HELPERS
// =============================================================================

fn storage(e: impl std::fmt::Display) -> TreeStoreError {
    TreeStoreError::StorageError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TreeStoreError> {
    postcard::to_allocvec(value).map_err(|e| TreeStoreError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TreeStoreError> {
    postcard::from_bytes(bytes).map_err(|e| TreeStoreError::SerializationError(e.to_string()))
}

/// Load and decode one record.
fn load<T: DeserializeOwned>(
    table: &impl ReadableTable<u128, &'static [u8]>,
    id: u128,
) -> Result<Option<T>, TreeStoreError> {
    match table.get(id).map_err(storage)? {
        Some(data) => Ok(Some(decode(data.value())?)),
        None => Ok(None),
    }
}

/// Decode every record of a table, in key order.
fn load_all<T: DeserializeOwned>(
    table: &impl ReadableTable<u128, &'static [u8]>,
) -> Result<Vec<T>, TreeStoreError> {
    let mut records = Vec::new();
    for entry in table.iter().map_err(storage)? {
        let (_, value) = entry.map_err(storage)?;
        records.push(decode(value.value())?);
    }
    Ok(records)
}

/// Owner id of a name or metadata key.
fn owner(
    table: &impl ReadableTable<&'static str, u128>,
    key: &str,
) -> Result<Option<u128>, TreeStoreError> {
    Ok(table.get(key).map_err(storage)?.map(|v| v.value()))
}

/// Ids indexed under `head`, in id order.
fn indexed(
    table: &impl ReadableTable<(u128, u128), ()>,
    head: u128,
) -> Result<Vec<u128>, TreeStoreError> {
    let mut ids = Vec::new();
    for entry in table
        .range((head, u128::MIN)..=(head, u128::MAX))
        .map_err(storage)?
    {
        let (key, _) = entry.map_err(storage)?;
        ids.push(key.value().1);
    }
    Ok(ids)
}

/// Whether any id is indexed under `head`.
fn has_indexed(
    table: &impl ReadableTable<(u128, u128), ()>,
    head: u128,
) -> Result<bool, TreeStoreError> {
    let mut range = table
        .range((head, u128::MIN)..=(head, u128::MAX))
        .map_err(storage)?;
    Ok(range.next().transpose().map_err(storage)?.is_some())
}

/// Tag resolver over an open tags table.
fn tag_resolver(
    tags: &impl ReadableTable<u128, &'static [u8]>,
) -> impl FnMut(TagId) -> Result<Option<Tag>, TreeStoreError> + '_ {
    move |id| load(tags, id.as_u128())
}

// =============================================================================
// STORE
// =============================================================================

/// A persistent store over one redb database file.
#[derive(Clone)]
pub struct RedbStore {
    categories: category::RedbCategories,
    entities: entity::RedbEntities,
    tags: tag::RedbTags,
    relationships: relationship::RedbRelationships,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TreeStoreError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| TreeStoreError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(storage)?;
        {
            write_txn.open_table(CATEGORIES).map_err(storage)?;
            write_txn.open_table(CATEGORY_NAMES).map_err(storage)?;
            write_txn.open_table(CATEGORY_CHILDREN).map_err(storage)?;
            write_txn.open_table(ENTITIES).map_err(storage)?;
            write_txn.open_table(ENTITY_NAMES).map_err(storage)?;
            write_txn.open_table(ENTITIES_BY_CATEGORY).map_err(storage)?;
            write_txn.open_table(ENTITIES_BY_TAG).map_err(storage)?;
            write_txn.open_table(TAGS).map_err(storage)?;
            write_txn.open_table(TAG_NAMES).map_err(storage)?;
            write_txn.open_table(RELATIONSHIPS).map_err(storage)?;
            write_txn.open_table(RELATIONSHIPS_BY_ENTITY).map_err(storage)?;
            write_txn.open_table(RELATIONSHIPS_BY_TAG).map_err(storage)?;
            write_txn.open_table(METADATA).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;

        tracing::debug!(path = %path.as_ref().display(), "Opened redb store");

        let db = Arc::new(db);
        Ok(Self {
            categories: category::RedbCategories(Arc::clone(&db)),
            entities: entity::RedbEntities(Arc::clone(&db)),
            tags: tag::RedbTags(Arc::clone(&db)),
            relationships: relationship::RedbRelationships(db),
        })
    }
}

impl Store for RedbStore {
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
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::entity::Entity;
    use crate::facet::{FacetProperty, FacetPropertyType};
    use crate::relationship::Relationship;
    use crate::types::{ItemKind, Named};
    use crate::values::{FacetValue, ValueHolder};
    use tempfile::tempdir;

    fn child_of(parent: &Category, name: &str) -> Category {
        let mut child = Category::new(name);
        parent.add_sub_category(&mut child);
        child
    }

    fn entity_in(category: &Category, name: &str, store: &RedbStore) -> Entity {
        let mut entity = Entity::new(name);
        entity
            .set_category(category, store.categories())
            .expect("categorize");
        entity
    }

    #[test]
    fn root_is_created_once() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        let first = store.categories().root().expect("root");
        let second = store.categories().root().expect("root");
        assert_eq!(first, second);
        assert!(first.is_root());
    }

    #[test]
    fn concurrent_root_creation_yields_one_root() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        let roots: Vec<Category> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
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
    fn category_constraints() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let categories = store.categories();
        let root = categories.root().expect("root");

        categories.upsert(child_of(&root, "Docs")).expect("docs");
        assert!(matches!(
            categories.upsert(child_of(&root, "DOCS")),
            Err(TreeStoreError::DuplicateName { .. })
        ));
        assert!(matches!(
            categories.upsert(Category::new("loose")),
            Err(TreeStoreError::MissingParent(_))
        ));
        assert!(matches!(
            categories.upsert(child_of(&Category::new("ghost"), "x")),
            Err(TreeStoreError::MissingParent(_))
        ));
        assert!(matches!(
            categories.delete(&root),
            Err(TreeStoreError::RootProtected)
        ));
    }

    #[test]
    fn moving_a_category_updates_the_child_index() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let categories = store.categories();
        let root = categories.root().expect("root");
        let a = categories.upsert(child_of(&root, "a")).expect("a");
        let b = categories.upsert(child_of(&root, "b")).expect("b");
        let mut c = categories.upsert(child_of(&a, "c")).expect("c");

        b.add_sub_category(&mut c);
        categories.upsert(c.clone()).expect("move");

        assert!(categories.find_by_parent(&a).expect("children").is_empty());
        assert_eq!(categories.find_by_parent(&b).expect("children"), vec![c]);
        assert!(
            categories
                .find_by_parent_and_name(&b, "C")
                .expect("find")
                .is_some()
        );
    }

    #[test]
    fn entity_indexes_follow_updates() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let root = store.categories().root().expect("root");
        let docs = store
            .categories()
            .upsert(child_of(&root, "docs"))
            .expect("docs");
        let tag = store.tags().upsert(Tag::new("book")).expect("tag");

        let mut entity = entity_in(&root, "readme", &store);
        entity.add_tag(tag.clone());
        let mut entity = store.entities().upsert(entity).expect("entity");

        entity
            .set_category(&docs, store.categories())
            .expect("move");
        entity.remove_tag(&tag, store.categories()).expect("untag");
        store.entities().upsert(entity.clone()).expect("update");

        assert!(store.entities().find_by_category(&root).expect("root").is_empty());
        assert_eq!(store.entities().find_by_category(&docs).expect("docs"), vec![entity]);
        assert!(store.entities().find_by_tag(&tag).expect("tag").is_empty());
        assert!(store.tags().delete(&tag).expect("delete tag"));

        assert!(matches!(
            store.entities().upsert(entity_in(&docs, "README", &store)),
            Err(TreeStoreError::DuplicateName {
                kind: ItemKind::Entity,
                ..
            })
        ));
    }

    #[test]
    fn relationship_blocks_entity_delete() {
        let temp = tempdir().expect("temp dir");
        let store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
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

        assert!(!store.entities().delete(&a).expect("refused"));
        assert_eq!(store.relationships().find_by_entity(&b).expect("by entity").len(), 1);

        assert!(store.relationships().delete(&rel).expect("delete rel"));
        assert!(store.entities().delete(&a).expect("delete"));
    }

    #[test]
    fn data_persists_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let owner = FacetProperty::new("owner", FacetPropertyType::String);

        let (root_id, entity_id) = {
            let store = RedbStore::open(&db_path).expect("open db");
            let root = store.categories().root().expect("root");
            let mut docs = child_of(&root, "docs");
            docs.facet_mut().add_property(owner.clone()).expect("add");
            let docs = store.categories().upsert(docs).expect("docs");

            let mut entity = entity_in(&docs, "readme", &store);
            entity
                .set_facet_property(&owner, FacetValue::String("ann".into()))
                .expect("set");
            let entity = store.entities().upsert(entity).expect("entity");
            (root.id(), entity.id())
        };
        // Store dropped here, simulating process exit

        let store = RedbStore::open(&db_path).expect("reopen db");
        let root = store.categories().root().expect("root");
        assert_eq!(root.id(), root_id);

        let entity = store
            .entities()
            .find_by_id(entity_id)
            .expect("find")
            .expect("exists");
        assert_eq!(entity.name(), "readme");
        assert_eq!(
            entity.values().get(owner.id()),
            Some(&FacetValue::String("ann".into()))
        );
        let docs = store
            .categories()
            .find_by_parent_and_name(&root, "docs")
            .expect("find")
            .expect("exists");
        assert_eq!(docs.facet().properties(), &[owner]);
    }
}
