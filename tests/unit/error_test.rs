//! Tests for error types

use machine_lot::core::{FailureKind, MachineError, RoutineError, RoutineFailure};

#[test]
fn test_machine_error_display() {
    assert_eq!(format!("{}", MachineError::Closed), "closed");
    assert_eq!(format!("{}", MachineError::NoRuntime), "no tokio runtime available");
    assert_eq!(
        format!("{}", MachineError::InvalidConfig("max_routines".into())),
        "invalid configuration: max_routines"
    );
    assert_eq!(
        format!("{}", MachineError::Backend("down".into())),
        "backend error: down"
    );
}

#[test]
fn test_machine_error_converts_to_failure() {
    let err = RoutineError::from(MachineError::Closed);
    assert!(matches!(err, RoutineError::Failed(_)));
    assert_eq!(format!("{err}"), "closed");
}

#[test]
fn test_failure_record_serializes() {
    let failure = RoutineFailure {
        routine_id: "r1".into(),
        tags: vec!["io".into()],
        message: "boom".into(),
        kind: FailureKind::Panic,
        at_ms: 7,
    };
    let value = serde_json::to_value(&failure).unwrap();
    assert_eq!(value["kind"], "panic");
    assert_eq!(value["routine_id"], "r1");
}
