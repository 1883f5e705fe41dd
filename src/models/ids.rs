//! Aggregate id helpers. Ids arrive from the identity provider or the
//! gateway as opaque strings, so no format is enforced here.

use uuid::Uuid;

/// Fresh id for groups and join requests created locally.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reject blank ids at command boundaries.
pub fn require_id(id: &str, name: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err(format!("{} is required", name));
    }
    Ok(())
}
