//! # Storage
//!
//! Two implementations of the repository contracts:
//!
//! - `MemoryStore`: `BTreeMap` tables behind a lock, for tests and
//!   ephemeral sessions
//! - `RedbStore`: redb tables with postcard-encoded records, for persistent
//!   sessions
//!
//! Both persist entities and relationships by tag *identity* and resolve the
//! tags again on every read, so a read always sees the current tag facets.

pub mod memory;
pub mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::entity::Entity;
use crate::relationship::Relationship;
use crate::tag::Tag;
use crate::types::{CategoryId, EntityId, Identified, Named, RelationshipId, TagId};
use crate::values::{PropertyValues, ValueHolder};
use crate::TreeStoreError;
use serde::{Deserialize, Serialize};

/// Stored form of an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntityRecord {
    pub id: EntityId,
    pub name: String,
    pub category: Option<CategoryId>,
    pub tags: Vec<TagId>,
    pub values: PropertyValues,
}

impl EntityRecord {
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            id: entity.id(),
            name: entity.name().to_string(),
            category: entity.category(),
            tags: entity.tags().iter().map(Tag::id).collect(),
            values: entity.values().clone(),
        }
    }

    /// Rebuild the entity, resolving tag ids through `resolve`.
    ///
    /// Tags that no longer exist are skipped.
    pub fn into_entity<F>(self, resolve: F) -> Result<Entity, TreeStoreError>
    where
        F: FnMut(TagId) -> Result<Option<Tag>, TreeStoreError>,
    {
        let tags = resolve_tags(&self.tags, resolve)?;
        Ok(Entity::from_parts(
            self.id,
            self.name,
            self.category,
            tags,
            self.values,
        ))
    }
}

/// Stored form of a relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RelationshipRecord {
    pub id: RelationshipId,
    pub name: String,
    pub from: Option<EntityId>,
    pub to: Option<EntityId>,
    pub tags: Vec<TagId>,
    pub values: PropertyValues,
}

impl RelationshipRecord {
    pub fn from_relationship(relationship: &Relationship) -> Self {
        Self {
            id: relationship.id(),
            name: relationship.name().to_string(),
            from: relationship.from_entity(),
            to: relationship.to_entity(),
            tags: relationship.tags().iter().map(Tag::id).collect(),
            values: relationship.values().clone(),
        }
    }

    pub fn into_relationship<F>(self, resolve: F) -> Result<Relationship, TreeStoreError>
    where
        F: FnMut(TagId) -> Result<Option<Tag>, TreeStoreError>,
    {
        let tags = resolve_tags(&self.tags, resolve)?;
        Ok(Relationship::from_parts(
            self.id,
            self.name,
            self.from,
            self.to,
            tags,
            self.values,
        ))
    }

    pub fn touches(&self, entity: EntityId) -> bool {
        self.from == Some(entity) || self.to == Some(entity)
    }
}

fn resolve_tags<F>(ids: &[TagId], mut resolve: F) -> Result<Vec<Tag>, TreeStoreError>
where
    F: FnMut(TagId) -> Result<Option<Tag>, TreeStoreError>,
{
    let mut tags = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(tag) = resolve(*id)? {
            tags.push(tag);
        }
    }
    Ok(tags)
}

/// Identity and uniqueness check shared by both stores: `true` if `key` is
/// free or already owned by `owner`.
pub(crate) fn key_available<I: PartialEq>(current_owner: Option<I>, owner: I) -> bool {
    current_owner.is_none_or(|current| current == owner)
}

/// Fail with `NotFound` for every tag of `item` that `exists` rejects.
pub(crate) fn ensure_tags_exist<T, F>(item: &T, tags: &[Tag], mut exists: F) -> Result<(), TreeStoreError>
where
    T: Identified,
    F: FnMut(TagId) -> Result<bool, TreeStoreError>,
{
    for tag in tags {
        if !exists(tag.id())? {
            tracing::debug!(item = %item.item_ref(), tag = %tag.id(), "Tag of item is not stored");
            return Err(TreeStoreError::not_found(tag.kind(), tag.identity()));
        }
    }
    Ok(())
}
