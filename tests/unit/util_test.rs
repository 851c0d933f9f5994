//! Tests for utility functions

use machine_lot::util::{generate_id, init_tracing, now_ms};

#[test]
fn test_generate_id_distinct() {
    assert_ne!(generate_id(), generate_id());
}

#[test]
fn test_now_ms_advances() {
    let first = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > first);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
