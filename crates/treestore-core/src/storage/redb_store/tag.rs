use super::{
    ENTITIES_BY_TAG, RELATIONSHIPS_BY_TAG, TAGS, TAG_NAMES, encode, has_indexed, load, load_all,
    owner, storage,
};
use crate::repository::TagRepository;
use crate::tag::Tag;
use crate::types::{ItemKind, Named, TagId};
use crate::TreeStoreError;
use redb::{Database, ReadableDatabase};
use std::sync::Arc;

#[derive(Clone)]
pub(super) struct RedbTags(pub(super) Arc<Database>);

impl TagRepository for RedbTags {
    fn upsert(&self, tag: Tag) -> Result<Tag, TreeStoreError> {
        let id = tag.id().as_u128();
        let key = tag.unique_name();
        let bytes = encode(&tag)?;

        let write_txn = self.0.begin_write().map_err(storage)?;
        {
            let mut records = write_txn.open_table(TAGS).map_err(storage)?;
            let mut names = write_txn.open_table(TAG_NAMES).map_err(storage)?;

            if owner(&names, &key)?.is_some_and(|current| current != id) {
                return Err(TreeStoreError::DuplicateName {
                    kind: ItemKind::Tag,
                    name: tag.name().to_string(),
                });
            }
            if let Some(previous) = load::<Tag>(&records, id)? {
                names
                    .remove(previous.unique_name().as_str())
                    .map_err(storage)?;
            }

            records.insert(id, bytes.as_slice()).map_err(storage)?;
            names.insert(key.as_str(), id).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;

        Ok(tag)
    }

    fn find_by_id(&self, id: TagId) -> Result<Option<Tag>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(TAGS).map_err(storage)?;
        load(&records, id.as_u128())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Tag>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(TAGS).map_err(storage)?;
        let names = read_txn.open_table(TAG_NAMES).map_err(storage)?;

        match owner(&names, &name.to_lowercase())? {
            Some(id) => load(&records, id),
            None => Ok(None),
        }
    }

    fn find_all(&self) -> Result<Vec<Tag>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(TAGS).map_err(storage)?;
        load_all(&records)
    }

    fn delete(&self, tag: &Tag) -> Result<bool, TreeStoreError> {
        let id = tag.id().as_u128();

        let write_txn = self.0.begin_write().map_err(storage)?;
        let deleted = {
            let entities = write_txn.open_table(ENTITIES_BY_TAG).map_err(storage)?;
            let relationships = write_txn.open_table(RELATIONSHIPS_BY_TAG).map_err(storage)?;
            if has_indexed(&entities, id)? || has_indexed(&relationships, id)? {
                tracing::debug!(tag = %tag.id(), "Refusing to delete tag in use");
                return Ok(false);
            }

            let mut records = write_txn.open_table(TAGS).map_err(storage)?;
            let mut names = write_txn.open_table(TAG_NAMES).map_err(storage)?;
            match load::<Tag>(&records, id)? {
                Some(stored) => {
                    records.remove(id).map_err(storage)?;
                    names
                        .remove(stored.unique_name().as_str())
                        .map_err(storage)?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit().map_err(storage)?;

        Ok(deleted)
    }
}
