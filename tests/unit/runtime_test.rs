//! Tests for tokio spawner utilities

use machine_lot::core::{Machine, MachineOptions, Spawn};
use machine_lot::runtime::TokioSpawner;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(Box::pin(async move {
        tx.send(123).unwrap();
    }));

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_current_inside_runtime() {
    assert!(TokioSpawner::current().is_ok());
}

#[test]
fn test_tokio_spawner_current_outside_runtime() {
    assert!(TokioSpawner::current().is_err());
}

#[test]
fn test_tokio_spawner_dedicated_runtime() {
    let spawner = TokioSpawner::with_worker_threads(1).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    spawner.spawn(Box::pin(async move {
        tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
    }));
    let name = rx.recv().expect("task ran");
    assert_eq!(name.as_deref(), Some("machine-routine"));
}

#[test]
fn test_machine_on_explicit_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let spawner = Arc::new(TokioSpawner::new(runtime.handle().clone()));
    let machine = Machine::new(MachineOptions::new().with_spawner(spawner)).unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    runtime.block_on(async {
        machine
            .go(move |routine| async move {
                let _ = tx.send(routine.id().to_owned());
                Ok(())
            })
            .await;
        let id = rx.await.expect("routine ran");
        assert_eq!(id.len(), 36);
        machine.wait().await;
    });
    assert_eq!(machine.total(), 1);
}
