//! Benchmarks for BlockKV store operations

use blockkv::region::Region;
use blockkv::{Config, KvStore, PolyHasher};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const BLOCKS: usize = 100_000;

fn memory_store() -> KvStore {
    let config = Config::builder()
        .key_payload_bytes(30)
        .value_payload_bytes(100)
        .block_count(BLOCKS)
        .build();
    KvStore::with_regions(
        Region::in_memory(config.key_region_len()),
        Region::in_memory(config.value_region_len()),
        config,
        PolyHasher,
    )
    .unwrap()
}

fn key(i: u32) -> Vec<u8> {
    format!("bench-key-{:08}", i).into_bytes()
}

fn store_benchmarks(c: &mut Criterion) {
    let value = vec![0x5Au8; 250];

    c.bench_function("put_new_key", |b| {
        let store = memory_store();
        let mut i = 0u32;
        b.iter(|| {
            // Keep the store from filling up
            if i as usize % (BLOCKS / 4) == 0 {
                for k in store.keys().collect::<Vec<_>>() {
                    store.delete(&k).unwrap();
                }
            }
            store.put(black_box(&key(i)), black_box(&value)).unwrap();
            i = i.wrapping_add(1);
        })
    });

    c.bench_function("get_hit", |b| {
        let store = memory_store();
        for i in 0..10_000 {
            store.put(&key(i), &value).unwrap();
        }
        let mut i = 0u32;
        b.iter(|| {
            black_box(store.get(black_box(&key(i % 10_000))).unwrap());
            i = i.wrapping_add(1);
        })
    });

    c.bench_function("overwrite_varying_len", |b| {
        let store = memory_store();
        let k = key(0);
        let mut len = 1usize;
        b.iter(|| {
            store.put(&k, &value[..len]).unwrap();
            len = len % value.len() + 1;
        })
    });
}

criterion_group!(benches, store_benchmarks);
criterion_main!(benches);
