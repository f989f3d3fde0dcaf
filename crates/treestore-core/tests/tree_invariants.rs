//! # Tree Invariant Tests
//!
//! The structural guarantees of the store, checked against both storage
//! backends. If ANY of these fails, the store is INVALID.

use treestore_core::{
    Category, CategoryCopyTraverser, CategoryRemovalTraverser, Entity, FacetProperty,
    FacetPropertyType, FacetValue, MemoryStore, Named, RedbStore, Store, Tag, TreeStoreError,
    ValueHolder,
};

/// Run `check` against a fresh in-memory store and a fresh redb store.
fn for_each_store(check: impl Fn(&dyn Store)) {
    let memory: &dyn Store = &MemoryStore::new();
    check(memory);

    let temp = tempfile::tempdir().expect("temp dir");
    let redb = RedbStore::open(temp.path().join("invariants.redb")).expect("open redb");
    let redb: &dyn Store = &redb;
    check(redb);
}

fn child_of(store: &dyn Store, parent: &Category, name: &str) -> Category {
    let mut child = Category::new(name);
    parent.add_sub_category(&mut child);
    store.categories().upsert(child).expect("category")
}

fn entity_in(store: &dyn Store, category: &Category, name: &str) -> Entity {
    let mut entity = Entity::new(name);
    entity
        .set_category(category, store.categories())
        .expect("categorize");
    store.entities().upsert(entity).expect("entity")
}

// =============================================================================
// UNIQUENESS
// =============================================================================

mod uniqueness {
    use super::*;

    #[test]
    fn sibling_categories_differ_case_insensitively() {
        for_each_store(|store| {
            let root = store.categories().root().expect("root");
            let docs = child_of(store, &root, "Docs");

            let mut dup = Category::new("DOCS");
            root.add_sub_category(&mut dup);
            let result = store.categories().upsert(dup);
            assert!(matches!(result, Err(TreeStoreError::DuplicateName { .. })));

            // Same name under a different parent is fine.
            child_of(store, &docs, "docs");
        });
    }

    #[test]
    fn entities_in_one_category_differ_case_insensitively() {
        for_each_store(|store| {
            let root = store.categories().root().expect("root");
            let docs = child_of(store, &root, "docs");
            let other = child_of(store, &root, "other");
            entity_in(store, &docs, "readme");

            let mut dup = Entity::new("README");
            dup.set_category(&docs, store.categories())
                .expect("categorize");
            let result = store.entities().upsert(dup);
            assert!(matches!(result, Err(TreeStoreError::DuplicateName { .. })));

            entity_in(store, &other, "README");
        });
    }

    #[test]
    fn tag_names_are_unique_case_insensitively() {
        for_each_store(|store| {
            store.tags().upsert(Tag::new("Urgent")).expect("tag");
            let result = store.tags().upsert(Tag::new("urgent"));
            assert!(matches!(result, Err(TreeStoreError::DuplicateName { .. })));
            assert!(store.tags().find_by_name("URGENT").expect("find").is_some());
        });
    }
}

// =============================================================================
// ROOT
// =============================================================================

mod root {
    use super::*;

    #[test]
    fn root_is_a_protected_singleton() {
        for_each_store(|store| {
            let first = store.categories().root().expect("root");
            let second = store.categories().root().expect("root");
            assert_eq!(first, second);
            child_of(store, &first, "docs");

            let traverser = CategoryRemovalTraverser::new(store.categories(), store.entities());
            assert!(!traverser.delete_if_empty(&first).expect("if empty"));
            assert!(!traverser.delete_recursively(&first).expect("recursive"));
            assert!(matches!(
                store.categories().delete(&first),
                Err(TreeStoreError::RootProtected)
            ));
            assert_eq!(store.categories().find_all().expect("all").len(), 2);
        });
    }

    #[test]
    fn parentless_categories_other_than_root_are_rejected() {
        for_each_store(|store| {
            store.categories().root().expect("root");
            let result = store.categories().upsert(Category::new("stray"));
            assert!(matches!(result, Err(TreeStoreError::MissingParent(_))));
        });
    }

    #[test]
    fn entities_need_an_existing_category() {
        for_each_store(|store| {
            let result = store.entities().upsert(Entity::new("loose"));
            assert!(matches!(result, Err(TreeStoreError::OrphanItem(_))));
        });
    }
}

// =============================================================================
// FACETS & VALUES
// =============================================================================

mod facets {
    use super::*;

    #[test]
    fn effective_facets_are_self_then_ancestors() {
        for_each_store(|store| {
            let root = store.categories().root().expect("root");
            let a = child_of(store, &root, "a");
            let b = child_of(store, &a, "b");

            let facets = b.effective_facets(store.categories()).expect("facets");
            let ids: Vec<_> = facets.iter().map(|f| f.id()).collect();
            assert_eq!(ids, vec![b.facet().id(), a.facet().id(), root.facet().id()]);
        });
    }

    #[test]
    fn removing_a_tag_purges_its_values() {
        for_each_store(|store| {
            let root = store.categories().root().expect("root");
            let pages = FacetProperty::new("pages", FacetPropertyType::Long);
            let mut book = Tag::new("book");
            book.facet_mut().add_property(pages.clone()).expect("add");
            let book = store.tags().upsert(book).expect("tag");

            let mut entity = Entity::new("manual");
            entity
                .set_category(&root, store.categories())
                .expect("categorize");
            entity.add_tag(book.clone());
            entity
                .set_facet_property(&pages, FacetValue::Long(42))
                .expect("set");
            let mut entity = store.entities().upsert(entity).expect("entity");

            assert!(entity.remove_tag(&book, store.categories()).expect("remove"));
            assert!(!entity.values().contains(pages.id()));
        });
    }

    #[test]
    fn values_are_type_checked() {
        let mut entity = Entity::new("counter");
        let count = FacetProperty::new("count", FacetPropertyType::Long);

        let result = entity.set_facet_property(&count, FacetValue::String("7".into()));
        assert!(matches!(
            result,
            Err(TreeStoreError::PropertyTypeMismatch { .. })
        ));

        entity
            .set_facet_property(&count, FacetValue::Long(i64::MAX))
            .expect("set");
        assert_eq!(
            entity.try_get_facet_property(&count),
            Some(&FacetValue::Long(i64::MAX))
        );
    }

    #[test]
    fn removing_a_property_twice_is_a_no_op() {
        let mut category = Category::new("docs");
        let owner = FacetProperty::new("owner", FacetPropertyType::String);
        category
            .facet_mut()
            .add_property(owner.clone())
            .expect("add");

        assert!(category.facet_mut().remove_property(owner.id()).is_some());
        assert!(category.facet_mut().remove_property(owner.id()).is_none());
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

mod traversal {
    use super::*;

    #[test]
    fn recursive_copy_is_isomorphic() {
        for_each_store(|store| {
            let root = store.categories().root().expect("root");
            let owner = FacetProperty::new("owner", FacetPropertyType::String);
            let mut src = Category::new("src");
            root.add_sub_category(&mut src);
            src.facet_mut().add_property(owner.clone()).expect("add");
            let src = store.categories().upsert(src).expect("src");
            let sub = child_of(store, &src, "sub");
            let mut entity = Entity::new("item");
            entity
                .set_category(&src, store.categories())
                .expect("categorize");
            entity
                .set_facet_property(&owner, FacetValue::String("ann".into()))
                .expect("set");
            let entity = store.entities().upsert(entity).expect("entity");
            let dst = child_of(store, &root, "dst");

            let traverser = CategoryCopyTraverser::new(store.categories(), store.entities());
            let clone = traverser
                .copy_category_recursively(&src, &dst)
                .expect("copy");

            assert_eq!(clone.name(), src.name());
            assert_ne!(clone, src);
            assert_eq!(clone.parent(), Some(dst.id()));

            let subs = store.categories().find_by_parent(&clone).expect("subs");
            assert_eq!(subs.len(), 1);
            assert_eq!(subs[0].name(), sub.name());
            assert_ne!(subs[0], sub);

            let copies = store.entities().find_by_category(&clone).expect("copies");
            assert_eq!(copies.len(), 1);
            assert_eq!(copies[0].name(), entity.name());
            assert_ne!(copies[0], entity);
            assert_eq!(copies[0].values(), entity.values());
        });
    }

    #[test]
    fn non_recursive_copy_copies_the_top_category_only() {
        for_each_store(|store| {
            let root = store.categories().root().expect("root");
            let src = child_of(store, &root, "src");
            child_of(store, &src, "sub");
            entity_in(store, &src, "item");
            let dst = child_of(store, &root, "dst");

            let traverser = CategoryCopyTraverser::new(store.categories(), store.entities());
            let clone = traverser.copy_category(&src, &dst).expect("copy");

            assert!(store.categories().find_by_parent(&clone).expect("subs").is_empty());
            assert!(store.entities().find_by_category(&clone).expect("items").is_empty());
        });
    }

    #[test]
    fn recursive_delete_removes_everything_below() {
        for_each_store(|store| {
            let root = store.categories().root().expect("root");
            let doomed = child_of(store, &root, "doomed");
            let inner = child_of(store, &doomed, "inner");
            let innermost = child_of(store, &inner, "innermost");
            let top = entity_in(store, &doomed, "top");
            let deep = entity_in(store, &innermost, "deep");

            let traverser = CategoryRemovalTraverser::new(store.categories(), store.entities());
            assert!(traverser.delete_recursively(&doomed).expect("delete"));

            for category in [&doomed, &inner, &innermost] {
                assert!(store.categories().find_by_id(category.id()).expect("find").is_none());
            }
            for entity in [&top, &deep] {
                assert!(store.entities().find_by_id(entity.id()).expect("find").is_none());
            }
            assert_eq!(store.categories().find_all().expect("all"), vec![root.clone()]);
        });
    }

    /// root -> docs -> readme; README collides; docs is only deletable once
    /// empty.
    #[test]
    fn docs_readme_scenario() {
        for_each_store(|store| {
            let root = store.categories().root().expect("root");
            let docs = child_of(store, &root, "docs");
            let readme = entity_in(store, &docs, "readme");

            let mut shouting = Entity::new("README");
            shouting
                .set_category(&docs, store.categories())
                .expect("categorize");
            assert!(matches!(
                store.entities().upsert(shouting),
                Err(TreeStoreError::DuplicateName { .. })
            ));

            let traverser = CategoryRemovalTraverser::new(store.categories(), store.entities());
            assert!(!traverser.delete_if_empty(&docs).expect("non-empty"));
            assert!(store.entities().delete(&readme).expect("delete readme"));
            assert!(traverser.delete_if_empty(&docs).expect("empty"));
        });
    }
}
