//! # Property-Based Tests
//!
//! Invariants of the tree and the value maps under arbitrary inputs.

use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;
use treestore_core::{
    Category, Entity, FacetProperty, FacetPropertyType, FacetValue, MemoryStore, Named, Session,
    Store, TreeStoreError, ValueHolder, collect_subtree,
};

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_-]{0,11}"
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Inserting any list of sibling names leaves exactly one category per
    /// case-insensitive name; every other insert fails with DuplicateName.
    #[test]
    fn siblings_stay_unique(names in vec(name_strategy(), 1..30)) {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let mut seen = BTreeSet::new();

        for name in &names {
            let mut child = Category::new(name.as_str());
            root.add_sub_category(&mut child);
            let result = store.categories().upsert(child);
            if seen.insert(name.to_lowercase()) {
                prop_assert!(result.is_ok());
            } else {
                let is_duplicate = matches!(result, Err(TreeStoreError::DuplicateName { .. }));
                prop_assert!(is_duplicate);
            }
        }

        let children = store.categories().find_by_parent(&root).expect("children");
        prop_assert_eq!(children.len(), seen.len());
    }

    /// Any path of valid names created segment by segment resolves back to
    /// the same category and prints as the same path.
    #[test]
    fn paths_round_trip(segments in vec(name_strategy(), 1..8)) {
        let session = Session::new();
        let mut current = session.root().expect("root");
        for segment in &segments {
            current = session
                .create_category(current.id(), segment)
                .expect("create");
        }

        let path = segments.join("/");
        let resolved = session.resolve_path(&path).expect("resolve");
        prop_assert_eq!(&resolved, &current);
        prop_assert_eq!(
            session.category_path(&resolved).expect("path"),
            format!("/{path}")
        );
    }

    /// A subtree of any depth is collected completely, parents first.
    #[test]
    fn subtree_collection_is_complete(depth in 1usize..20, entities_per_level in 0usize..4) {
        let store = MemoryStore::new();
        let root = store.categories().root().expect("root");
        let mut chain = Vec::new();
        let mut parent = root.clone();

        for level in 0..depth {
            let mut child = Category::new(format!("level-{level}"));
            parent.add_sub_category(&mut child);
            let child = store.categories().upsert(child).expect("category");
            for n in 0..entities_per_level {
                let mut entity = Entity::new(format!("e{n}"));
                entity
                    .set_category(&child, store.categories())
                    .expect("categorize");
                store.entities().upsert(entity).expect("entity");
            }
            chain.push(child.clone());
            parent = child;
        }

        let subtree = collect_subtree(store.categories(), store.entities(), &chain[0])
            .expect("collect");
        prop_assert_eq!(subtree.categories.as_slice(), &chain[1..]);
        prop_assert_eq!(subtree.entities.len(), depth * entities_per_level);
    }

    /// Purging keeps exactly the values whose property is still declared.
    #[test]
    fn purge_keeps_only_declared_values(
        values in vec(any::<i64>(), 1..20),
        keep_mask in vec(any::<bool>(), 20)
    ) {
        let mut category = Category::new("docs");
        let mut entity = Entity::new("item");
        let mut kept = BTreeSet::new();

        for (i, value) in values.iter().enumerate() {
            let property = FacetProperty::new(format!("p{i}"), FacetPropertyType::Long);
            entity
                .set_facet_property(&property, FacetValue::Long(*value))
                .expect("set");
            if keep_mask[i] {
                category
                    .facet_mut()
                    .add_property(property.clone())
                    .expect("add");
                kept.insert(property.id());
            }
        }

        let purged = entity.purge_stale_values(&[category.facet().clone()]);
        prop_assert_eq!(purged, values.len() - kept.len());
        let remaining: BTreeSet<_> = entity.values().iter().map(|(id, _)| id).collect();
        prop_assert_eq!(remaining, kept);
    }

    /// Names are accepted iff non-empty, trimmed and slash-free.
    #[test]
    fn category_names_are_validated(name in "[ a-z/]{0,6}") {
        let session = Session::new();
        let root = session.root().expect("root");
        let valid = !name.is_empty() && name.trim() == name && !name.contains('/');

        let result = session.create_category(root.id(), &name);
        if valid {
            let category = result.expect("valid");
            prop_assert_eq!(category.name(), name.as_str());
        } else {
            let is_invalid = matches!(result, Err(TreeStoreError::InvalidName(_)));
            prop_assert!(is_invalid);
        }
    }
}
