use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use uuid::Uuid;

use replist_core::snapshot::generate_items;
use replist_core::{DocumentHistory, SortedStorage, StorageOp};

const STORAGE_SIZE: usize = 100_000;

fn prebuilt_storage() -> (SortedStorage, Vec<Uuid>) {
    let items = generate_items(STORAGE_SIZE, 1);
    let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
    (SortedStorage::from_items(items), ids)
}

fn bench_set_insert(c: &mut Criterion) {
    let (mut storage, _) = prebuilt_storage();
    let mut rng = rand::thread_rng();

    c.bench_function("set_insert_100k", |b| {
        b.iter(|| {
            let op = StorageOp::Set {
                id: Uuid::new_v4(),
                value: rng.gen(),
                author: 1,
                timestamp: 1,
            };
            black_box(storage.apply_ops(&[op]));
        })
    });
}

fn bench_set_update(c: &mut Criterion) {
    let (mut storage, ids) = prebuilt_storage();
    let mut rng = rand::thread_rng();

    c.bench_function("set_update_100k", |b| {
        b.iter(|| {
            let op = StorageOp::Set {
                id: ids[rng.gen_range(0..ids.len())],
                value: rng.gen(),
                author: 1,
                timestamp: 1,
            };
            black_box(storage.apply_ops(&[op]));
        })
    });
}

fn bench_delete_and_revive(c: &mut Criterion) {
    let (mut storage, ids) = prebuilt_storage();
    let mut rng = rand::thread_rng();

    // Delete then revive the same id so the live set stays at full size.
    c.bench_function("delete_revive_100k", |b| {
        b.iter(|| {
            let id = ids[rng.gen_range(0..ids.len())];
            let del = StorageOp::Delete { id, author: 1, timestamp: 1 };
            let set = StorageOp::Set { id, value: rng.gen(), author: 1, timestamp: 2 };
            black_box(storage.apply_ops(&[del, set]));
        })
    });
}

fn bench_diff_concat(c: &mut Criterion) {
    let history = DocumentHistory::new();
    let mut rng = rand::thread_rng();

    // 100 versions of 50 inserts each; diff from v0 concatenates them all.
    for v in 0..100u64 {
        let ops: Vec<StorageOp> = (0..50)
            .map(|_| StorageOp::Set {
                id: Uuid::new_v4(),
                value: rng.gen(),
                author: 1,
                timestamp: v + 1,
            })
            .collect();
        history.add_version(ops);
    }

    c.bench_function("diff_from_v0_100x50", |b| {
        b.iter(|| {
            black_box(history.diff_with_latest(black_box(0)));
        })
    });
}

criterion_group!(
    benches,
    bench_set_insert,
    bench_set_update,
    bench_delete_and_revive,
    bench_diff_concat
);
criterion_main!(benches);
