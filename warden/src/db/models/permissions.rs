//! Database models for permissions.

use crate::types::PermissionId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Category of a permission record. Only non-`Button` records contribute to
/// the navigation menu tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "permission_kind", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionKind {
    Menu,
    Button,
    Api,
}

/// Permission record: the code checked at authorization time plus the
/// attributes the menu tree is built from.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PermissionDBResponse {
    pub id: PermissionId,
    /// Permission code, e.g. `"role:list"`
    pub code: String,
    pub name: String,
    pub kind: PermissionKind,
    pub parent_id: Option<PermissionId>,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
}
