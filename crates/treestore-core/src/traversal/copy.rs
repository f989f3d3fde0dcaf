//! Recursive subtree copy.

use crate::category::Category;
use crate::primitives::{MAX_TREE_DEPTH, validate_depth};
use crate::repository::{CategoryRepository, EntityRepository};
use crate::traversal::collect_subtree;
use crate::types::Named;
use crate::TreeStoreError;

/// Copies categories, and optionally their subtrees, under a destination.
///
/// Copies get fresh identities. Copied entities keep their tags and values,
/// minus the values whose property is not effective at the destination.
pub struct CategoryCopyTraverser<'a, C: ?Sized, E: ?Sized> {
    categories: &'a C,
    entities: &'a E,
}

impl<'a, C, E> CategoryCopyTraverser<'a, C, E>
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

    /// Copy `src` alone as a new child of `dst` and persist it.
    ///
    /// Fails with `DuplicateName` if `dst` already has a child of that name,
    /// and with `TreeTooDeep` if `dst` is at the maximum depth.
    pub fn copy_category(&self, src: &Category, dst: &Category) -> Result<Category, TreeStoreError> {
        validate_depth(src.name(), dst.depth(self.categories)? + 1)?;
        self.clone_under(src, dst)
    }

    fn clone_under(&self, src: &Category, dst: &Category) -> Result<Category, TreeStoreError> {
        let mut clone = src.clone_shallow();
        dst.add_sub_category(&mut clone);
        let clone = self.categories.upsert(clone)?;

        tracing::debug!(src = %src.id(), clone = %clone.id(), dst = %dst.id(), "Copied category");
        Ok(clone)
    }

    /// Copy `src` with all sub-categories and entities under `dst`.
    ///
    /// Depth-first, sub-categories before sibling entities. A destination
    /// inside the source subtree is rejected with `SubtreeCycle`, and a copy
    /// that would outgrow `MAX_TREE_DEPTH` with `TreeTooDeep`, before
    /// anything is written. A collision at any level aborts the copy; items
    /// copied before the collision remain.
    pub fn copy_category_recursively(
        &self,
        src: &Category,
        dst: &Category,
    ) -> Result<Category, TreeStoreError> {
        if dst.is_within(src, self.categories)? {
            return Err(TreeStoreError::SubtreeCycle(src.name().to_string()));
        }
        let height = collect_subtree(self.categories, self.entities, src)?.height;
        validate_depth(src.name(), dst.depth(self.categories)? + 1 + height)?;

        let mut copied = 0usize;
        let clone = self.copy_subtree(src, dst, 0, &mut copied)?;

        tracing::info!(
            src = %src.id(),
            clone = %clone.id(),
            items = copied,
            "Copied category subtree"
        );
        Ok(clone)
    }

    fn copy_subtree(
        &self,
        src: &Category,
        dst: &Category,
        depth: usize,
        copied: &mut usize,
    ) -> Result<Category, TreeStoreError> {
        if depth > MAX_TREE_DEPTH {
            return Err(TreeStoreError::InvalidTree(format!(
                "subtree of '{}' exceeds {} levels",
                src.name(),
                MAX_TREE_DEPTH
            )));
        }

        let clone = self.clone_under(src, dst)?;
        *copied += 1;

        for sub in self.categories.find_by_parent(src)? {
            self.copy_subtree(&sub, &clone, depth + 1, copied)?;
        }

        for entity in self.entities.find_by_category(src)? {
            let mut copy = entity.clone_entity();
            let purged = copy.set_category(&clone, self.categories)?;
            if purged > 0 {
                tracing::debug!(entity = %entity.id(), purged, "Dropped values not effective at copy destination");
            }
            self.entities.upsert(copy)?;
            *copied += 1;
        }

        Ok(clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::facet::{FacetProperty, FacetPropertyType};
    use crate::repository::Store;
    use crate::storage::MemoryStore;
    use crate::values::{FacetValue, ValueHolder};

    fn child_of(store: &MemoryStore, parent: &Category, name: &str) -> Category {
        let mut child = Category::new(name);
        parent.add_sub_category(&mut child);
        store.categories().upsert(child).expect("category")
    }

    #[test]
    fn non_recursive_copy_copies_top_node_only() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let src = child_of(&store, &root, "src");
        child_of(&store, &src, "sub");
        let dst = child_of(&store, &root, "dst");

        let traverser = CategoryCopyTraverser::new(store.categories(), store.entities());
        let clone = traverser.copy_category(&src, &dst).expect("copy");

        assert_ne!(clone, src);
        assert_eq!(clone.name(), "src");
        assert_eq!(clone.parent(), Some(dst.id()));
        assert!(store.categories().find_by_parent(&clone).expect("children").is_empty());
    }

    #[test]
    fn copy_collision_surfaces_as_duplicate() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let src = child_of(&store, &root, "src");

        let traverser = CategoryCopyTraverser::new(store.categories(), store.entities());
        let result = traverser.copy_category(&src, &root);
        assert!(matches!(result, Err(TreeStoreError::DuplicateName { .. })));
    }

    #[test]
    fn copy_into_own_subtree_is_rejected() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let src = child_of(&store, &root, "src");
        let inner = child_of(&store, &src, "inner");

        let traverser = CategoryCopyTraverser::new(store.categories(), store.entities());
        for dst in [&src, &inner] {
            let result = traverser.copy_category_recursively(&src, dst);
            assert!(matches!(result, Err(TreeStoreError::SubtreeCycle(_))));
        }
        assert_eq!(store.categories().find_all().expect("all").len(), 3);
    }

    #[test]
    fn copy_beyond_depth_limit_is_rejected() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let src = child_of(&store, &root, "src");
        child_of(&store, &src, "sub");
        let mut deepest = root.clone();
        for level in 1..MAX_TREE_DEPTH {
            deepest = child_of(&store, &deepest, &format!("l{level}"));
        }
        let before = store.categories().find_all().expect("all").len();

        // One level of room: `src` fits, `src/sub` does not.
        let traverser = CategoryCopyTraverser::new(store.categories(), store.entities());
        let result = traverser.copy_category_recursively(&src, &deepest);
        assert!(matches!(result, Err(TreeStoreError::TreeTooDeep { .. })));
        assert_eq!(store.categories().find_all().expect("all").len(), before);

        let clone = traverser.copy_category(&src, &deepest).expect("top node fits");
        assert!(matches!(
            traverser.copy_category(&src, &clone),
            Err(TreeStoreError::TreeTooDeep { .. })
        ));
    }

    #[test]
    fn copied_entities_drop_values_of_facets_left_behind() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");

        let parent_prop = FacetProperty::new("project", FacetPropertyType::String);
        let mut outer = Category::new("outer");
        root.add_sub_category(&mut outer);
        outer
            .facet_mut()
            .add_property(parent_prop.clone())
            .expect("add");
        let outer = store.categories().upsert(outer).expect("outer");

        let own_prop = FacetProperty::new("owner", FacetPropertyType::String);
        let mut src = Category::new("src");
        outer.add_sub_category(&mut src);
        src.facet_mut().add_property(own_prop.clone()).expect("add");
        let src = store.categories().upsert(src).expect("src");

        let mut entity = Entity::new("readme");
        entity
            .set_category(&src, store.categories())
            .expect("categorize");
        entity
            .set_facet_property(&parent_prop, FacetValue::String("x".into()))
            .expect("set");
        entity
            .set_facet_property(&own_prop, FacetValue::String("ann".into()))
            .expect("set");
        store.entities().upsert(entity).expect("entity");

        let traverser = CategoryCopyTraverser::new(store.categories(), store.entities());
        let clone = traverser
            .copy_category_recursively(&src, &root)
            .expect("copy");

        let copies = store.entities().find_by_category(&clone).expect("copies");
        assert_eq!(copies.len(), 1);
        assert_eq!(
            copies[0].try_get_facet_property(&own_prop),
            Some(&FacetValue::String("ann".into()))
        );
        assert!(copies[0].try_get_facet_property(&parent_prop).is_none());
        assert_eq!(copies[0].values().len(), 1);
    }
}
