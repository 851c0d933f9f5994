//! Routine identifier generation.

use uuid::Uuid;

/// Generate a fresh routine identifier.
///
/// Identifiers are random v4 UUIDs in hyphenated form, so concurrently active
/// routines never collide in practice.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
