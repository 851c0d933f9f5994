//! Tests for machine builders

use std::sync::Arc;

use machine_lot::builders::{build_in_memory_machine, build_machine};
use machine_lot::config::MachineConfig;
use machine_lot::core::MachineError;
use machine_lot::infra::{Cache, InMemoryCache, InMemoryPubSub, PubSub};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_in_memory_machine() {
    let cfg = MachineConfig {
        name: Some("built".into()),
        max_routines: 3,
        ..MachineConfig::default()
    };
    let machine = build_in_memory_machine(&cfg).unwrap();
    assert_eq!(machine.name(), "built");
    assert_eq!(machine.max_routines(), 3);
    assert!(!machine.cache().is_closed());
    assert!(!machine.pubsub().is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_machine_uses_factories() {
    let cache = Arc::new(InMemoryCache::new());
    let pubsub = Arc::new(InMemoryPubSub::new());
    let machine = {
        let cache = Arc::clone(&cache);
        let pubsub = Arc::clone(&pubsub);
        build_machine(
            &MachineConfig::default(),
            move |_| Ok(cache.clone() as Arc<dyn Cache>),
            move |_| Ok(pubsub.clone() as Arc<dyn PubSub>),
        )
        .unwrap()
    };

    machine.cache().set("k", serde_json::json!(1)).unwrap();
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_machine_rejects_invalid_config() {
    let cfg = MachineConfig {
        max_routines: 0,
        ..MachineConfig::default()
    };
    let err = build_in_memory_machine(&cfg).unwrap_err();
    assert!(matches!(err, MachineError::InvalidConfig(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_machine_propagates_factory_error() {
    let result = build_machine(
        &MachineConfig::default(),
        |_| Err(MachineError::Backend("cache unavailable".into())),
        |_| Ok(Arc::new(InMemoryPubSub::new()) as Arc<dyn PubSub>),
    );
    assert!(matches!(result, Err(MachineError::Backend(_))));
}
