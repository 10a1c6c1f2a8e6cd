use std::sync::Arc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::NamedTempFile;

use quartzdb::common::types::Rid;
use quartzdb::index::btree::BPlusTree;
use quartzdb::storage::buffer::BufferPoolManager;

fn bench_btree_insert(c: &mut Criterion) {
    c.bench_function("btree_insert_1k", |b| {
        b.iter_with_setup(
            || {
                let file = NamedTempFile::new().unwrap();
                let pool = Arc::new(BufferPoolManager::new(512, 2, file.path()).unwrap());
                let tree = BPlusTree::<i64>::new("bench", pool, 64, 64).unwrap();
                (tree, file)
            },
            |(tree, _file)| {
                for key in 0..1000i64 {
                    tree.insert(black_box(key), Rid::new(0, key as u32)).unwrap();
                }
            },
        );
    });
}

fn bench_btree_lookup(c: &mut Criterion) {
    let file = NamedTempFile::new().unwrap();
    let pool = Arc::new(BufferPoolManager::new(512, 2, file.path()).unwrap());
    let tree = BPlusTree::<i64>::new("bench", pool, 64, 64).unwrap();
    for key in 0..10_000i64 {
        tree.insert(key, Rid::new(0, key as u32)).unwrap();
    }

    c.bench_function("btree_lookup", |b| {
        let mut key = 0i64;
        b.iter(|| {
            key = (key + 4999) % 10_000;
            black_box(tree.get_value(&key).unwrap());
        });
    });
}

criterion_group!(benches, bench_btree_insert, bench_btree_lookup);
criterion_main!(benches);
