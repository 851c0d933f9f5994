//! Tests for the in-memory cache backend

use std::sync::Arc;

use machine_lot::core::MachineError;
use machine_lot::infra::{Cache, InMemoryCache};
use serde_json::json;

#[test]
fn test_cache_overwrite_and_delete() {
    let cache = InMemoryCache::new();
    cache.set("k", json!(1)).unwrap();
    cache.set("k", json!(2)).unwrap();
    assert_eq!(cache.get("k").unwrap(), Some(json!(2)));
    assert_eq!(cache.delete("k").unwrap(), Some(json!(2)));
    assert_eq!(cache.delete("k").unwrap(), None);
    assert!(cache.is_empty());
}

#[test]
fn test_cache_concurrent_writers() {
    let cache = Arc::new(InMemoryCache::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for j in 0..100 {
                    cache.set(&format!("{i}-{j}"), json!(j)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.len(), 800);
}

#[test]
fn test_cache_close_is_idempotent() {
    let cache = InMemoryCache::new();
    cache.set("k", json!(true)).unwrap();
    cache.close();
    cache.close();
    assert!(cache.is_closed());
    assert!(matches!(cache.get("k"), Err(MachineError::Closed)));
}
