//! # Tree Benchmarks
//!
//! Performance benchmarks for the recursive traversers and path lookups.
//!
//! Run with: `cargo bench -p treestore-core`

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use treestore_core::{
    Category, CategoryCopyTraverser, CategoryRemovalTraverser, Entity, MemoryStore, Session,
    Store,
};

/// A store with `/src` holding `width` sub-categories of `width` entities
/// each, plus an empty `/dst`.
fn create_wide_tree(width: usize) -> (MemoryStore, Category, Category) {
    let store = MemoryStore::new();
    let root = store.categories().root().expect("root");

    let mut src = Category::new("src");
    root.add_sub_category(&mut src);
    let src = store.categories().upsert(src).expect("src");
    let mut dst = Category::new("dst");
    root.add_sub_category(&mut dst);
    let dst = store.categories().upsert(dst).expect("dst");

    for i in 0..width {
        let mut sub = Category::new(format!("sub-{i}"));
        src.add_sub_category(&mut sub);
        let sub = store.categories().upsert(sub).expect("sub");
        for j in 0..width {
            let mut entity = Entity::new(format!("item-{j}"));
            entity
                .set_category(&sub, store.categories())
                .expect("categorize");
            store.entities().upsert(entity).expect("entity");
        }
    }

    (store, src, dst)
}

/// A session holding one chain of `depth` nested categories.
fn create_deep_session(depth: usize) -> (Session, String) {
    let session = Session::new();
    let mut current = session.root().expect("root");
    let mut path = String::new();
    for i in 0..depth {
        let name = format!("level-{i}");
        current = session
            .create_category(current.id(), &name)
            .expect("create");
        path.push('/');
        path.push_str(&name);
    }
    (session, path)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_recursive_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursive_copy");

    for width in [4, 16, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, &width| {
            b.iter_batched(
                || create_wide_tree(width),
                |(store, src, dst)| {
                    let traverser =
                        CategoryCopyTraverser::new(store.categories(), store.entities());
                    black_box(traverser.copy_category_recursively(&src, &dst))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_recursive_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursive_delete");

    for width in [4, 16, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, &width| {
            b.iter_batched(
                || create_wide_tree(width),
                |(store, src, _)| {
                    let traverser =
                        CategoryRemovalTraverser::new(store.categories(), store.entities());
                    black_box(traverser.delete_recursively(&src))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_path_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_resolution");

    for depth in [8, 32, 128].iter() {
        let (session, path) = create_deep_session(*depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &path, |b, path| {
            b.iter(|| black_box(session.resolve_path(path)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_recursive_copy,
    bench_recursive_delete,
    bench_path_resolution
);
criterion_main!(benches);
