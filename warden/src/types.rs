//! Common type definitions.
//!
//! Users are identified by UUIDs; roles and permissions use the integer
//! identifiers their tables hand out (the default administrator role is
//! pinned to role id 1).

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type RoleId = i32;
pub type PermissionId = i32;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Role id reserved for the default administrator role.
pub const DEFAULT_ADMIN_ROLE_ID: RoleId = 1;
