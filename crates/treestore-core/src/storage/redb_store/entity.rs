use super::{
    CATEGORIES, ENTITIES, ENTITIES_BY_CATEGORY, ENTITIES_BY_TAG, ENTITY_NAMES,
    RELATIONSHIPS_BY_ENTITY, TAGS, encode, has_indexed, indexed, load, owner, storage,
    tag_resolver,
};
use crate::category::Category;
use crate::entity::Entity;
use crate::primitives::unique_key;
use crate::repository::EntityRepository;
use crate::storage::{EntityRecord, ensure_tags_exist};
use crate::tag::Tag;
use crate::types::{EntityId, ItemKind, Named};
use crate::TreeStoreError;
use redb::{Database, ReadableDatabase, ReadableTable};
use std::sync::Arc;

#[derive(Clone)]
pub(super) struct RedbEntities(pub(super) Arc<Database>);

impl RedbEntities {
    /// Load the entities whose ids are indexed under `head` in `index`.
    fn find_indexed(
        &self,
        index: redb::TableDefinition<(u128, u128), ()>,
        head: u128,
    ) -> Result<Vec<Entity>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(ENTITIES).map_err(storage)?;
        let tags = read_txn.open_table(TAGS).map_err(storage)?;
        let index = read_txn.open_table(index).map_err(storage)?;

        let mut found = Vec::new();
        for id in indexed(&index, head)? {
            if let Some(record) = load::<EntityRecord>(&records, id)? {
                found.push(record.into_entity(tag_resolver(&tags))?);
            }
        }
        Ok(found)
    }
}

impl EntityRepository for RedbEntities {
    fn upsert(&self, entity: Entity) -> Result<Entity, TreeStoreError> {
        let id = entity.id().as_u128();
        let record = EntityRecord::from_entity(&entity);
        let bytes = encode(&record)?;

        let write_txn = self.0.begin_write().map_err(storage)?;
        {
            let categories = write_txn.open_table(CATEGORIES).map_err(storage)?;
            let tags = write_txn.open_table(TAGS).map_err(storage)?;
            let mut records = write_txn.open_table(ENTITIES).map_err(storage)?;
            let mut names = write_txn.open_table(ENTITY_NAMES).map_err(storage)?;
            let mut by_category = write_txn.open_table(ENTITIES_BY_CATEGORY).map_err(storage)?;
            let mut by_tag = write_txn.open_table(ENTITIES_BY_TAG).map_err(storage)?;

            let category = match entity.category() {
                Some(category)
                    if categories
                        .get(category.as_u128())
                        .map_err(storage)?
                        .is_some() =>
                {
                    category.as_u128()
                }
                _ => return Err(TreeStoreError::OrphanItem(entity.name().to_string())),
            };

            let key = unique_key(entity.name(), entity.category());
            if owner(&names, &key)?.is_some_and(|current| current != id) {
                return Err(TreeStoreError::DuplicateName {
                    kind: ItemKind::Entity,
                    name: entity.name().to_string(),
                });
            }
            ensure_tags_exist(&entity, entity.tags(), |tag| {
                Ok(tags.get(tag.as_u128()).map_err(storage)?.is_some())
            })?;

            if let Some(previous) = load::<EntityRecord>(&records, id)? {
                names
                    .remove(unique_key(&previous.name, previous.category).as_str())
                    .map_err(storage)?;
                if let Some(old_category) = previous.category {
                    by_category
                        .remove((old_category.as_u128(), id))
                        .map_err(storage)?;
                }
                for tag in previous.tags {
                    by_tag.remove((tag.as_u128(), id)).map_err(storage)?;
                }
            }

            records.insert(id, bytes.as_slice()).map_err(storage)?;
            names.insert(key.as_str(), id).map_err(storage)?;
            by_category.insert((category, id), ()).map_err(storage)?;
            for tag in &record.tags {
                by_tag.insert((tag.as_u128(), id), ()).map_err(storage)?;
            }
        }
        write_txn.commit().map_err(storage)?;

        Ok(entity)
    }

    fn find_by_id(&self, id: EntityId) -> Result<Option<Entity>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(ENTITIES).map_err(storage)?;
        let tags = read_txn.open_table(TAGS).map_err(storage)?;

        load::<EntityRecord>(&records, id.as_u128())?
            .map(|record| record.into_entity(tag_resolver(&tags)))
            .transpose()
    }

    fn find_all(&self) -> Result<Vec<Entity>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(ENTITIES).map_err(storage)?;
        let tags = read_txn.open_table(TAGS).map_err(storage)?;

        super::load_all::<EntityRecord>(&records)?
            .into_iter()
            .map(|record| record.into_entity(tag_resolver(&tags)))
            .collect()
    }

    fn delete(&self, entity: &Entity) -> Result<bool, TreeStoreError> {
        let id = entity.id().as_u128();

        let write_txn = self.0.begin_write().map_err(storage)?;
        let deleted = {
            let references = write_txn
                .open_table(RELATIONSHIPS_BY_ENTITY)
                .map_err(storage)?;
            if has_indexed(&references, id)? {
                tracing::debug!(entity = %entity.id(), "Refusing to delete referenced entity");
                return Ok(false);
            }

            let mut records = write_txn.open_table(ENTITIES).map_err(storage)?;
            let mut names = write_txn.open_table(ENTITY_NAMES).map_err(storage)?;
            let mut by_category = write_txn.open_table(ENTITIES_BY_CATEGORY).map_err(storage)?;
            let mut by_tag = write_txn.open_table(ENTITIES_BY_TAG).map_err(storage)?;

            match load::<EntityRecord>(&records, id)? {
                Some(stored) => {
                    records.remove(id).map_err(storage)?;
                    names
                        .remove(unique_key(&stored.name, stored.category).as_str())
                        .map_err(storage)?;
                    if let Some(category) = stored.category {
                        by_category
                            .remove((category.as_u128(), id))
                            .map_err(storage)?;
                    }
                    for tag in stored.tags {
                        by_tag.remove((tag.as_u128(), id)).map_err(storage)?;
                    }
                    true
                }
                None => false,
            }
        };
        write_txn.commit().map_err(storage)?;

        Ok(deleted)
    }

    fn find_by_category(&self, category: &Category) -> Result<Vec<Entity>, TreeStoreError> {
        self.find_indexed(ENTITIES_BY_CATEGORY, category.id().as_u128())
    }

    fn find_by_category_and_name(
        &self,
        category: &Category,
        name: &str,
    ) -> Result<Option<Entity>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(ENTITIES).map_err(storage)?;
        let names = read_txn.open_table(ENTITY_NAMES).map_err(storage)?;
        let tags = read_txn.open_table(TAGS).map_err(storage)?;

        let Some(id) = owner(&names, &unique_key(name, Some(category.id())))? else {
            return Ok(None);
        };
        load::<EntityRecord>(&records, id)?
            .map(|record| record.into_entity(tag_resolver(&tags)))
            .transpose()
    }

    fn find_by_tag(&self, tag: &Tag) -> Result<Vec<Entity>, TreeStoreError> {
        self.find_indexed(ENTITIES_BY_TAG, tag.id().as_u128())
    }

    fn is_referenced(&self, entity: &Entity) -> Result<bool, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let references = read_txn
            .open_table(RELATIONSHIPS_BY_ENTITY)
            .map_err(storage)?;
        has_indexed(&references, entity.id().as_u128())
    }
}
