//! Tests for KvStore shared across threads

use std::sync::Arc;
use std::thread;

use blockkv::{Config, KvStore};
use tempfile::TempDir;

fn setup_shared_store(blocks: usize) -> (TempDir, Arc<KvStore>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .name("shared")
        .key_payload_bytes(30)
        .value_payload_bytes(100)
        .block_count(blocks)
        .build();
    let store = Arc::new(KvStore::open(config).unwrap());
    (temp_dir, store)
}

fn value_for(thread_id: usize, i: usize) -> Vec<u8> {
    vec![(thread_id * 31 + i) as u8; 1 + (i * 13) % 300]
}

#[test]
fn test_concurrent_writers_on_disjoint_keys() {
    let (_temp, store) = setup_shared_store(5000);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("t{}-k{}", t, i);
                    assert!(store.put(key.as_bytes(), &value_for(t, i)).unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 400);
    for t in 0..4 {
        for i in 0..100 {
            let key = format!("t{}-k{}", t, i);
            assert_eq!(store.get(key.as_bytes()).unwrap(), Some(value_for(t, i)));
        }
    }
}

#[test]
fn test_readers_see_whole_values() {
    let (_temp, store) = setup_shared_store(1000);
    let short = vec![1u8; 50];
    let long = vec![2u8; 750];
    store.put(b"flip", &short).unwrap();

    let writer = {
        let store = Arc::clone(&store);
        let (short, long) = (short.clone(), long.clone());
        thread::spawn(move || {
            for i in 0..200 {
                let value = if i % 2 == 0 { &long } else { &short };
                assert!(store.put(b"flip", value).unwrap());
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            let (short, long) = (short.clone(), long.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    let value = store.get(b"flip").unwrap().unwrap();
                    assert!(value == short || value == long);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    // One key, one value chain, nothing leaked by the overwrites
    let stats = store.stats();
    assert_eq!(stats.key_blocks_free, 999);
    assert_eq!(stats.value_blocks_free, 999);
}

#[test]
fn test_iteration_during_removal() {
    let (_temp, store) = setup_shared_store(1000);
    for i in 0..200 {
        store.put(format!("key-{:03}", i).as_bytes(), b"v").unwrap();
    }

    let remover = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in (0..200).step_by(2) {
                store.delete(format!("key-{:03}", i).as_bytes()).unwrap();
            }
        })
    };

    let seen: Vec<Vec<u8>> = store.keys().collect();
    remover.join().unwrap();

    // Odd keys are never removed, so every one of them is seen
    for i in (1..200).step_by(2) {
        let key = format!("key-{:03}", i).into_bytes();
        assert!(seen.contains(&key), "missing {}", i);
    }
    assert!(seen.len() <= 200);
    assert_eq!(store.len(), 100);
}
