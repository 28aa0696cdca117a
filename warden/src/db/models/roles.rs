//! Database models for roles.

use crate::types::{PermissionId, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role record without its permission associations.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleDBResponse {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role record together with its assigned permission ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDetailDBResponse {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub disabled: bool,
    pub permission_ids: Vec<PermissionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An enabled, non-deleted role reduced to what permission resolution needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleGrant {
    pub id: RoleId,
    pub name: String,
    pub permission_ids: Vec<PermissionId>,
}

/// Request to create a role with its initial permission associations.
#[derive(Debug, Clone)]
pub struct RoleCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
    pub disabled: bool,
    pub permission_ids: Vec<PermissionId>,
}

/// Request to patch a role. Absent fields are left untouched;
/// `permission_ids: Some(_)` replaces the full association set (an empty vec
/// clears it).
#[derive(Debug, Clone, Default)]
pub struct RoleUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub disabled: Option<bool>,
    pub permission_ids: Option<Vec<PermissionId>>,
}

impl RoleUpdateDBRequest {
    /// Whether applying this patch can change what the role grants, i.e.
    /// whether per-user permission caches need invalidation afterwards.
    pub fn touches_grants(&self) -> bool {
        self.disabled.is_some() || self.permission_ids.is_some()
    }
}

/// Sort direction for role listings (by creation time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter for listing roles. Soft-deleted roles are always excluded.
#[derive(Debug, Clone)]
pub struct RoleFilter {
    pub skip: i64,
    pub limit: i64,
    pub disabled: Option<bool>,
    /// Case-insensitive substring match on the role name
    pub keyword: Option<String>,
    pub begin_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub sort: SortOrder,
}

impl RoleFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            disabled: None,
            keyword: None,
            begin_time: None,
            end_time: None,
            sort: SortOrder::default(),
        }
    }
}

/// Outcome of a guarded (batch) role removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRemoval {
    /// All targets were live and unassigned; they are now soft-deleted.
    Removed,
    /// At least one target does not exist or is already deleted.
    NotFound,
    /// At least one target still has a user assigned.
    InUse,
}
