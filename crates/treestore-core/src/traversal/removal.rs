//! Recursive subtree delete.

use super::collect_subtree;
use crate::category::Category;
use crate::repository::{CategoryRepository, EntityRepository};
use crate::types::Named;
use crate::TreeStoreError;

/// Deletes categories while protecting the root and non-empty categories.
pub struct CategoryRemovalTraverser<'a, C: ?Sized, E: ?Sized> {
    categories: &'a C,
    entities: &'a E,
}

impl<'a, C, E> CategoryRemovalTraverser<'a, C, E>
where
    C: CategoryRepository + ?Sized,
    E: EntityRepository + ?Sized,
{
    #[must_use]
    pub fn new(categories: &'a C, entities: &'a E) -> Self {
        Self {
            categories,
            entities,
        }
    }

    /// Delete `category` only if it is not the root and holds neither
    /// sub-categories nor entities.
    pub fn delete_if_empty(&self, category: &Category) -> Result<bool, TreeStoreError> {
        if category.is_root() {
            tracing::warn!("Refusing to delete the root category");
            return Ok(false);
        }
        if !self.categories.find_by_parent(category)?.is_empty()
            || !self.entities.find_by_category(category)?.is_empty()
        {
            tracing::debug!(category = %category.id(), "Category is not empty");
            return Ok(false);
        }

        let deleted = self.categories.delete(category)?;
        if deleted {
            tracing::info!(category = %category.id(), "Deleted empty category");
        }
        Ok(deleted)
    }

    /// Delete `category` with every descendant category and entity.
    ///
    /// Returns `false` for the root. The whole subtree is collected before
    /// anything is deleted; if a collected entity is still referenced by a
    /// relationship the call fails with `ReferencedByRelationship` and the
    /// store is left unchanged.
    pub fn delete_recursively(&self, category: &Category) -> Result<bool, TreeStoreError> {
        if category.is_root() {
            tracing::warn!("Refusing to delete the root category");
            return Ok(false);
        }

        let subtree = collect_subtree(self.categories, self.entities, category)?;

        for entity in &subtree.entities {
            if self.entities.is_referenced(entity)? {
                tracing::warn!(entity = %entity.id(), "Subtree delete blocked by relationship");
                return Err(TreeStoreError::ReferencedByRelationship(
                    entity.name().to_string(),
                ));
            }
        }

        for entity in &subtree.entities {
            if !self.entities.delete(entity)? && self.entities.is_referenced(entity)? {
                return Err(TreeStoreError::ReferencedByRelationship(
                    entity.name().to_string(),
                ));
            }
        }
        for descendant in subtree.categories.iter().rev() {
            self.categories.delete(descendant)?;
        }
        let deleted = self.categories.delete(category)?;

        tracing::info!(
            category = %category.id(),
            categories = subtree.categories.len(),
            entities = subtree.entities.len(),
            "Deleted category subtree"
        );
        Ok(deleted)
    }
}
