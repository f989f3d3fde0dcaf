use super::{
    ENTITIES, RELATIONSHIPS, RELATIONSHIPS_BY_ENTITY, RELATIONSHIPS_BY_TAG, TAGS, encode, indexed,
    load, load_all, storage, tag_resolver,
};
use crate::entity::Entity;
use crate::relationship::Relationship;
use crate::repository::RelationshipRepository;
use crate::storage::{RelationshipRecord, ensure_tags_exist};
use crate::tag::Tag;
use crate::types::{EntityId, ItemKind, RelationshipId};
use crate::TreeStoreError;
use redb::{Database, ReadableDatabase, ReadableTable, Table};
use std::sync::Arc;

#[derive(Clone)]
pub(super) struct RedbRelationships(pub(super) Arc<Database>);

/// Endpoints of a record, deduplicated (self-loops index once).
fn endpoints(record: &RelationshipRecord) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = record.from.into_iter().chain(record.to).collect();
    ids.dedup();
    ids
}

fn unindex(
    record: &RelationshipRecord,
    by_entity: &mut Table<(u128, u128), ()>,
    by_tag: &mut Table<(u128, u128), ()>,
) -> Result<(), TreeStoreError> {
    let id = record.id.as_u128();
    for entity in endpoints(record) {
        by_entity.remove((entity.as_u128(), id)).map_err(storage)?;
    }
    for tag in &record.tags {
        by_tag.remove((tag.as_u128(), id)).map_err(storage)?;
    }
    Ok(())
}

impl RedbRelationships {
    fn find_indexed(
        &self,
        index: redb::TableDefinition<(u128, u128), ()>,
        head: u128,
    ) -> Result<Vec<Relationship>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(RELATIONSHIPS).map_err(storage)?;
        let tags = read_txn.open_table(TAGS).map_err(storage)?;
        let index = read_txn.open_table(index).map_err(storage)?;

        let mut found = Vec::new();
        for id in indexed(&index, head)? {
            if let Some(record) = load::<RelationshipRecord>(&records, id)? {
                found.push(record.into_relationship(tag_resolver(&tags))?);
            }
        }
        Ok(found)
    }
}

impl RelationshipRepository for RedbRelationships {
    fn upsert(&self, relationship: Relationship) -> Result<Relationship, TreeStoreError> {
        let id = relationship.id().as_u128();
        let record = RelationshipRecord::from_relationship(&relationship);
        let bytes = encode(&record)?;

        let write_txn = self.0.begin_write().map_err(storage)?;
        {
            let entities = write_txn.open_table(ENTITIES).map_err(storage)?;
            let tags = write_txn.open_table(TAGS).map_err(storage)?;
            let mut records = write_txn.open_table(RELATIONSHIPS).map_err(storage)?;
            let mut by_entity = write_txn
                .open_table(RELATIONSHIPS_BY_ENTITY)
                .map_err(storage)?;
            let mut by_tag = write_txn.open_table(RELATIONSHIPS_BY_TAG).map_err(storage)?;

            for endpoint in endpoints(&record) {
                if entities
                    .get(endpoint.as_u128())
                    .map_err(storage)?
                    .is_none()
                {
                    return Err(TreeStoreError::not_found(
                        ItemKind::Entity,
                        endpoint.as_uuid(),
                    ));
                }
            }
            ensure_tags_exist(&relationship, relationship.tags(), |tag| {
                Ok(tags.get(tag.as_u128()).map_err(storage)?.is_some())
            })?;

            if let Some(previous) = load::<RelationshipRecord>(&records, id)? {
                unindex(&previous, &mut by_entity, &mut by_tag)?;
            }

            records.insert(id, bytes.as_slice()).map_err(storage)?;
            for entity in endpoints(&record) {
                by_entity.insert((entity.as_u128(), id), ()).map_err(storage)?;
            }
            for tag in &record.tags {
                by_tag.insert((tag.as_u128(), id), ()).map_err(storage)?;
            }
        }
        write_txn.commit().map_err(storage)?;

        Ok(relationship)
    }

    fn find_by_id(&self, id: RelationshipId) -> Result<Option<Relationship>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(RELATIONSHIPS).map_err(storage)?;
        let tags = read_txn.open_table(TAGS).map_err(storage)?;

        load::<RelationshipRecord>(&records, id.as_u128())?
            .map(|record| record.into_relationship(tag_resolver(&tags)))
            .transpose()
    }

    fn find_all(&self) -> Result<Vec<Relationship>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(RELATIONSHIPS).map_err(storage)?;
        let tags = read_txn.open_table(TAGS).map_err(storage)?;

        load_all::<RelationshipRecord>(&records)?
            .into_iter()
            .map(|record| record.into_relationship(tag_resolver(&tags)))
            .collect()
    }

    fn delete(&self, relationship: &Relationship) -> Result<bool, TreeStoreError> {
        let id = relationship.id().as_u128();

        let write_txn = self.0.begin_write().map_err(storage)?;
        let deleted = {
            let mut records = write_txn.open_table(RELATIONSHIPS).map_err(storage)?;
            let mut by_entity = write_txn
                .open_table(RELATIONSHIPS_BY_ENTITY)
                .map_err(storage)?;
            let mut by_tag = write_txn.open_table(RELATIONSHIPS_BY_TAG).map_err(storage)?;

            match load::<RelationshipRecord>(&records, id)? {
                Some(stored) => {
                    records.remove(id).map_err(storage)?;
                    unindex(&stored, &mut by_entity, &mut by_tag)?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit().map_err(storage)?;

        Ok(deleted)
    }

    fn find_by_entity(&self, entity: &Entity) -> Result<Vec<Relationship>, TreeStoreError> {
        self.find_indexed(RELATIONSHIPS_BY_ENTITY, entity.id().as_u128())
    }

    fn find_by_tag(&self, tag: &Tag) -> Result<Vec<Relationship>, TreeStoreError> {
        self.find_indexed(RELATIONSHIPS_BY_TAG, tag.id().as_u128())
    }
}
