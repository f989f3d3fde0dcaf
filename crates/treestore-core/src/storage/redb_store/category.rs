use super::{
    CATEGORIES, CATEGORY_CHILDREN, CATEGORY_NAMES, METADATA, ROOT_KEY, encode, indexed, load,
    load_all, owner, storage,
};
use crate::category::Category;
use crate::primitives::unique_key;
use crate::repository::CategoryRepository;
use crate::types::{CategoryId, ItemKind, Named};
use crate::TreeStoreError;
use redb::{Database, ReadableDatabase, ReadableTable};
use std::sync::Arc;

#[derive(Clone)]
pub(super) struct RedbCategories(pub(super) Arc<Database>);

impl CategoryRepository for RedbCategories {
    fn upsert(&self, category: Category) -> Result<Category, TreeStoreError> {
        let id = category.id().as_u128();
        let key = category.unique_name();
        let bytes = encode(&category)?;

        let write_txn = self.0.begin_write().map_err(storage)?;
        {
            let mut records = write_txn.open_table(CATEGORIES).map_err(storage)?;
            let mut names = write_txn.open_table(CATEGORY_NAMES).map_err(storage)?;
            let mut children = write_txn.open_table(CATEGORY_CHILDREN).map_err(storage)?;
            let mut meta = write_txn.open_table(METADATA).map_err(storage)?;

            if owner(&names, &key)?.is_some_and(|current| current != id) {
                return Err(TreeStoreError::DuplicateName {
                    kind: ItemKind::Category,
                    name: category.name().to_string(),
                });
            }

            match category.parent() {
                None => {
                    if owner(&meta, ROOT_KEY)?.is_some_and(|root| root != id) {
                        return Err(TreeStoreError::MissingParent(category.name().to_string()));
                    }
                    meta.insert(ROOT_KEY, id).map_err(storage)?;
                }
                Some(parent) => {
                    let parent = parent.as_u128();
                    if parent == id || records.get(parent).map_err(storage)?.is_none() {
                        return Err(TreeStoreError::MissingParent(category.name().to_string()));
                    }
                }
            }

            if let Some(previous) = load::<Category>(&records, id)? {
                names
                    .remove(previous.unique_name().as_str())
                    .map_err(storage)?;
                if let Some(old_parent) = previous.parent() {
                    children
                        .remove((old_parent.as_u128(), id))
                        .map_err(storage)?;
                }
            }

            records.insert(id, bytes.as_slice()).map_err(storage)?;
            names.insert(key.as_str(), id).map_err(storage)?;
            if let Some(parent) = category.parent() {
                children.insert((parent.as_u128(), id), ()).map_err(storage)?;
            }
        }
        write_txn.commit().map_err(storage)?;

        Ok(category)
    }

    fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(CATEGORIES).map_err(storage)?;
        load(&records, id.as_u128())
    }

    fn find_all(&self) -> Result<Vec<Category>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(CATEGORIES).map_err(storage)?;
        load_all(&records)
    }

    fn delete(&self, category: &Category) -> Result<bool, TreeStoreError> {
        let id = category.id().as_u128();

        let write_txn = self.0.begin_write().map_err(storage)?;
        let deleted = {
            let mut records = write_txn.open_table(CATEGORIES).map_err(storage)?;
            let mut names = write_txn.open_table(CATEGORY_NAMES).map_err(storage)?;
            let mut children = write_txn.open_table(CATEGORY_CHILDREN).map_err(storage)?;
            let meta = write_txn.open_table(METADATA).map_err(storage)?;

            if owner(&meta, ROOT_KEY)? == Some(id) {
                return Err(TreeStoreError::RootProtected);
            }

            match load::<Category>(&records, id)? {
                Some(stored) => {
                    records.remove(id).map_err(storage)?;
                    names
                        .remove(stored.unique_name().as_str())
                        .map_err(storage)?;
                    if let Some(parent) = stored.parent() {
                        children.remove((parent.as_u128(), id)).map_err(storage)?;
                    }
                    true
                }
                None => false,
            }
        };
        write_txn.commit().map_err(storage)?;

        Ok(deleted)
    }

    fn find_by_parent(&self, parent: &Category) -> Result<Vec<Category>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(CATEGORIES).map_err(storage)?;
        let children = read_txn.open_table(CATEGORY_CHILDREN).map_err(storage)?;

        let mut found = Vec::new();
        for child in indexed(&children, parent.id().as_u128())? {
            if let Some(category) = load(&records, child)? {
                found.push(category);
            }
        }
        Ok(found)
    }

    fn find_by_parent_and_name(
        &self,
        parent: &Category,
        name: &str,
    ) -> Result<Option<Category>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(CATEGORIES).map_err(storage)?;
        let names = read_txn.open_table(CATEGORY_NAMES).map_err(storage)?;

        match owner(&names, &unique_key(name, Some(parent.id())))? {
            Some(id) => load(&records, id),
            None => Ok(None),
        }
    }

    fn find_root(&self) -> Result<Option<Category>, TreeStoreError> {
        let read_txn = self.0.begin_read().map_err(storage)?;
        let records = read_txn.open_table(CATEGORIES).map_err(storage)?;
        let meta = read_txn.open_table(METADATA).map_err(storage)?;

        match owner(&meta, ROOT_KEY)? {
            Some(id) => load(&records, id),
            None => Ok(None),
        }
    }
}
