//! Tests for configuration validation and loading

use std::collections::HashMap;

use machine_lot::config::{CacheBackendConfig, MachineConfig, PubSubBackendConfig};
use machine_lot::core::DEFAULT_MAX_ROUTINES;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_default_config_is_valid() {
    let cfg = MachineConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.max_routines, DEFAULT_MAX_ROUTINES);
    assert_eq!(cfg.publish_timeout_ms, 5_000);
    assert_eq!(cfg.cache, CacheBackendConfig::InMemory);
    assert_eq!(cfg.pubsub, PubSubBackendConfig::InMemory);
}

#[test]
fn test_config_invalid_max_routines() {
    let cfg = MachineConfig {
        max_routines: 0,
        ..MachineConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_invalid_publish_timeout() {
    let cfg = MachineConfig {
        publish_timeout_ms: 0,
        ..MachineConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_invalid_empty_name() {
    let cfg = MachineConfig {
        name: Some(String::new()),
        ..MachineConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_from_json_fills_defaults() {
    let cfg = MachineConfig::from_json_str(r#"{"name":"crawler","max_routines":8}"#).unwrap();
    assert_eq!(cfg.name.as_deref(), Some("crawler"));
    assert_eq!(cfg.max_routines, 8);
    assert_eq!(cfg.publish_timeout_ms, 5_000);
}

#[test]
fn test_config_from_json_backend_selectors() {
    let cfg = MachineConfig::from_json_str(r#"{"cache":"in_memory","pubsub":"in_memory"}"#).unwrap();
    assert_eq!(cfg.cache, CacheBackendConfig::InMemory);
    assert_eq!(cfg.pubsub, PubSubBackendConfig::InMemory);
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(MachineConfig::from_json_str(r#"{"max_routines":0}"#).is_err());
    assert!(MachineConfig::from_json_str(r#"{"cache":"redis"}"#).is_err());
    assert!(MachineConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_from_lookup_overrides() {
    let cfg = MachineConfig::from_lookup(lookup(&[
        ("MACHINE_NAME", "workers"),
        ("MACHINE_MAX_ROUTINES", " 16 "),
        ("MACHINE_PUBLISH_TIMEOUT_MS", "250"),
        ("MACHINE_CACHE", "in_memory"),
    ]))
    .unwrap();
    assert_eq!(cfg.name.as_deref(), Some("workers"));
    assert_eq!(cfg.max_routines, 16);
    assert_eq!(cfg.publish_timeout_ms, 250);
}

#[test]
fn test_config_from_lookup_empty_keeps_defaults() {
    let cfg = MachineConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, MachineConfig::default());
}

#[test]
fn test_config_from_lookup_reports_bad_values() {
    let err = MachineConfig::from_lookup(lookup(&[("MACHINE_MAX_ROUTINES", "many")])).unwrap_err();
    assert!(err.starts_with("MACHINE_MAX_ROUTINES"), "{err}");

    let err = MachineConfig::from_lookup(lookup(&[("MACHINE_PUBSUB", "kafka")])).unwrap_err();
    assert!(err.starts_with("MACHINE_PUBSUB"), "{err}");

    assert!(MachineConfig::from_lookup(lookup(&[("MACHINE_MAX_ROUTINES", "0")])).is_err());
}
