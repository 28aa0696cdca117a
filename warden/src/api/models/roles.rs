//! API request/response models for role administration.

use super::pagination::Pagination;
use crate::db::models::roles::{RoleCreateDBRequest, RoleDBResponse, RoleDetailDBResponse, RoleFilter, RoleUpdateDBRequest, SortOrder};
use crate::types::{PermissionId, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing roles
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListRolesQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Case-insensitive substring match on the role name
    pub keyword: Option<String>,

    /// Filter by the disabled flag
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub disabled: Option<bool>,

    /// Lower bound on creation time (inclusive)
    pub begin_time: Option<DateTime<Utc>>,

    /// Upper bound on creation time (inclusive)
    pub end_time: Option<DateTime<Utc>>,

    /// Sort by creation time, "asc" or "desc" (default: desc)
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub sort: Option<SortOrder>,
}

impl ListRolesQuery {
    pub fn to_filter(&self) -> RoleFilter {
        RoleFilter {
            skip: self.pagination.skip(),
            limit: self.pagination.limit(),
            disabled: self.disabled,
            keyword: self.keyword.clone(),
            begin_time: self.begin_time,
            end_time: self.end_time,
            sort: self.sort.unwrap_or_default(),
        }
    }
}

/// Request body for creating a new role.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleCreate {
    /// Display name for the role (must be unique among live roles)
    #[schema(example = "auditor")]
    pub name: String,
    /// Optional description of the role's purpose
    pub description: Option<String>,
    /// Whether the role starts out disabled
    #[serde(default)]
    pub disabled: bool,
    /// Permission ids to associate with the role
    pub permissions: Option<Vec<PermissionId>>,
}

impl From<RoleCreate> for RoleCreateDBRequest {
    fn from(request: RoleCreate) -> Self {
        Self {
            name: request.name,
            description: request.description,
            disabled: request.disabled,
            permission_ids: request.permissions.unwrap_or_default(),
        }
    }
}

/// Request body for updating a role. Absent fields are left unchanged.
///
/// `permissions` distinguishes absent from explicit null: absent leaves the
/// association set untouched, while `null` or `[]` clears it and a list
/// replaces it wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RoleUpdate {
    /// New display name (absent to keep unchanged)
    pub name: Option<String>,
    /// New description (absent to keep unchanged)
    pub description: Option<String>,
    /// New disabled flag (absent to keep unchanged)
    pub disabled: Option<bool>,
    /// Full replacement for the permission association set
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<Vec<i32>>)]
    pub permissions: Option<Option<Vec<PermissionId>>>,
}

impl From<RoleUpdate> for RoleUpdateDBRequest {
    fn from(request: RoleUpdate) -> Self {
        Self {
            name: request.name,
            description: request.description,
            disabled: request.disabled,
            // Explicit null means "clear all associations"
            permission_ids: request.permissions.map(|permissions| permissions.unwrap_or_default()),
        }
    }
}

/// Request body for removing several roles at once.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleBatchRemove {
    pub ids: Vec<RoleId>,
}

/// Role summary returned by list/create endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RoleDBResponse> for RoleResponse {
    fn from(db: RoleDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            disabled: db.disabled,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Full role details including its permission associations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleDetailResponse {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub disabled: bool,
    pub permissions: Vec<PermissionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RoleDetailDBResponse> for RoleDetailResponse {
    fn from(db: RoleDetailDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            disabled: db.disabled,
            permissions: db.permission_ids,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_permissions_absent_vs_null_vs_list() {
        // Absent: associations untouched
        let update: RoleUpdate = serde_json::from_str(r#"{"name": "ops"}"#).unwrap();
        let db = RoleUpdateDBRequest::from(update);
        assert_eq!(db.permission_ids, None);
        assert!(!db.touches_grants());

        // Explicit null: clear all
        let update: RoleUpdate = serde_json::from_str(r#"{"permissions": null}"#).unwrap();
        let db = RoleUpdateDBRequest::from(update);
        assert_eq!(db.permission_ids, Some(vec![]));
        assert!(db.touches_grants());

        // Empty list: clear all
        let update: RoleUpdate = serde_json::from_str(r#"{"permissions": []}"#).unwrap();
        let db = RoleUpdateDBRequest::from(update);
        assert_eq!(db.permission_ids, Some(vec![]));

        // List: full replace
        let update: RoleUpdate = serde_json::from_str(r#"{"permissions": [3, 5]}"#).unwrap();
        let db = RoleUpdateDBRequest::from(update);
        assert_eq!(db.permission_ids, Some(vec![3, 5]));
    }
}
