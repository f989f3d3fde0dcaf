//! # Categories
//!
//! Categories form a single-rooted tree. Each category owns one facet and
//! exposes the union of its own facet and the facets of all its ancestors.
//!
//! The tree is stored as an id-keyed arena: a category holds its parent's
//! identity, never a live reference. Ancestor walks resolve through a
//! `CategoryRepository`, so there are no reference cycles and equality and
//! hashing stay cheap (identity only).

use crate::facet::Facet;
use crate::primitives::{MAX_TREE_DEPTH, ROOT_CATEGORY_NAME, unique_key};
use crate::repository::CategoryRepository;
use crate::types::{CategoryId, Identified, ItemKind, Named, identity_equality};
use crate::TreeStoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node of the category tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    id: CategoryId,
    name: String,
    parent: Option<CategoryId>,
    facet: Facet,
}

impl Category {
    /// Create a detached category with a fresh identity and an empty facet.
    ///
    /// Attach it with `add_sub_category` before persisting: only the root
    /// may be stored without a parent.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: CategoryId::new(),
            facet: Facet::new(name.clone()),
            name,
            parent: None,
        }
    }

    /// Create the root category.
    #[must_use]
    pub fn new_root() -> Self {
        Self::new(ROOT_CATEGORY_NAME)
    }

    #[must_use]
    pub fn id(&self) -> CategoryId {
        self.id
    }

    #[must_use]
    pub fn parent(&self) -> Option<CategoryId> {
        self.parent
    }

    /// A category without a parent. Storage only ever accepts one.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[must_use]
    pub fn facet(&self) -> &Facet {
        &self.facet
    }

    pub fn facet_mut(&mut self) -> &mut Facet {
        &mut self.facet
    }

    /// Derived uniqueness key: `lower(name) + "_" + (parent id | <root>)`.
    #[must_use]
    pub fn unique_name(&self) -> String {
        unique_key(&self.name, self.parent)
    }

    /// Make `child` a direct sub-category of this category.
    pub fn add_sub_category(&self, child: &mut Category) {
        child.parent = Some(self.id);
    }

    /// Detach `child` if it is a direct sub-category of this category.
    pub fn detach_sub_category(&self, child: &mut Category) {
        if child.parent == Some(self.id) {
            child.parent = None;
        }
    }

    /// Shallow clone: same name, fresh identity, no parent and no children.
    ///
    /// The facet is copied with its property definitions so values of
    /// copied entities stay valid below the clone.
    #[must_use]
    pub fn clone_shallow(&self) -> Self {
        Self {
            id: CategoryId::new(),
            name: self.name.clone(),
            parent: None,
            facet: self.facet.clone_definitions(),
        }
    }

    /// Ancestors of this category, nearest first, root last.
    pub fn ancestors<R: CategoryRepository + ?Sized>(
        &self,
        categories: &R,
    ) -> Result<Vec<Category>, TreeStoreError> {
        let mut ancestors = Vec::new();
        let mut next = self.parent;

        while let Some(parent_id) = next {
            if ancestors.len() >= MAX_TREE_DEPTH {
                return Err(TreeStoreError::InvalidTree(format!(
                    "ancestor chain of '{}' exceeds {} levels",
                    self.name, MAX_TREE_DEPTH
                )));
            }
            let parent = categories.find_by_id(parent_id)?.ok_or_else(|| {
                TreeStoreError::InvalidTree(format!(
                    "parent {} of '{}' does not exist",
                    parent_id, self.name
                ))
            })?;
            next = parent.parent;
            ancestors.push(parent);
        }

        Ok(ancestors)
    }

    /// Number of ancestors; the root is at depth 0.
    pub fn depth<R: CategoryRepository + ?Sized>(&self, categories: &R) -> Result<usize, TreeStoreError> {
        Ok(self.ancestors(categories)?.len())
    }

    /// Own facet followed by the facets of all ancestors (self, then
    /// parent, ..., then root). Recomputed on every call.
    pub fn effective_facets<R: CategoryRepository + ?Sized>(
        &self,
        categories: &R,
    ) -> Result<Vec<Facet>, TreeStoreError> {
        let mut facets = vec![self.facet.clone()];
        facets.extend(
            self.ancestors(categories)?
                .into_iter()
                .map(|ancestor| ancestor.facet),
        );
        Ok(facets)
    }

    /// Whether this category is `other` or lies inside `other`'s subtree.
    pub fn is_within<R: CategoryRepository + ?Sized>(
        &self,
        other: &Category,
        categories: &R,
    ) -> Result<bool, TreeStoreError> {
        if self == other {
            return Ok(true);
        }
        Ok(self
            .ancestors(categories)?
            .iter()
            .any(|ancestor| ancestor == other))
    }
}

impl Identified for Category {
    fn identity(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Category
    }
}

impl Named for Category {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

identity_equality!(Category);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::{FacetProperty, FacetPropertyType};
    use crate::repository::Store;
    use crate::storage::MemoryStore;

    fn child_of(parent: &Category, name: &str) -> Category {
        let mut child = Category::new(name);
        parent.add_sub_category(&mut child);
        child
    }

    #[test]
    fn unique_name_combines_lowercase_name_and_parent() {
        let root = Category::new_root();
        let docs = child_of(&root, "Docs");

        assert_eq!(root.unique_name(), "_<root>_<root>");
        assert_eq!(docs.unique_name(), format!("docs_{}", root.id()));
    }

    #[test]
    fn add_and_detach_sub_category() {
        let root = Category::new_root();
        let other = Category::new("other");
        let mut docs = child_of(&root, "docs");
        assert_eq!(docs.parent(), Some(root.id()));

        other.detach_sub_category(&mut docs);
        assert_eq!(docs.parent(), Some(root.id()), "only the parent detaches");

        root.detach_sub_category(&mut docs);
        assert!(docs.parent().is_none());
    }

    #[test]
    fn clone_shallow_gets_fresh_identity() {
        let root = Category::new_root();
        let mut docs = child_of(&root, "docs");
        docs.facet_mut()
            .add_property(FacetProperty::new("owner", FacetPropertyType::String))
            .expect("add");

        let clone = docs.clone_shallow();
        assert_ne!(clone, docs);
        assert_eq!(clone.name(), "docs");
        assert!(clone.parent().is_none());
        assert_eq!(clone.facet().properties(), docs.facet().properties());
    }

    #[test]
    fn effective_facets_are_self_then_ancestors() {
        let store = MemoryStore::new();
        let categories = store.categories();
        let root = categories.root().expect("root");
        let a = categories.upsert(child_of(&root, "a")).expect("a");
        let b = categories.upsert(child_of(&a, "b")).expect("b");

        let facets = b.effective_facets(categories).expect("facets");
        assert_eq!(
            facets,
            vec![b.facet().clone(), a.facet().clone(), root.facet().clone()]
        );
    }

    #[test]
    fn effective_facets_of_root_is_own_facet() {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let facets = root.effective_facets(store.categories()).expect("facets");
        assert_eq!(facets, vec![root.facet().clone()]);
    }

    #[test]
    fn is_within_detects_subtree_membership() {
        let store = MemoryStore::new();
        let categories = store.categories();
        let root = categories.root().expect("root");
        let a = categories.upsert(child_of(&root, "a")).expect("a");
        let b = categories.upsert(child_of(&a, "b")).expect("b");
        let c = categories.upsert(child_of(&root, "c")).expect("c");

        assert!(b.is_within(&a, categories).expect("within"));
        assert!(a.is_within(&a, categories).expect("within"));
        assert!(!a.is_within(&b, categories).expect("within"));
        assert!(!c.is_within(&a, categories).expect("within"));
    }

    #[test]
    fn dangling_parent_is_reported() {
        let store = MemoryStore::new();
        let ghost = Category::new("ghost");
        let orphan = child_of(&ghost, "orphan");

        let result = orphan.effective_facets(store.categories());
        assert!(matches!(result, Err(TreeStoreError::InvalidTree(_))));
    }
}
