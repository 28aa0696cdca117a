//! Database layer: the credential store seam, its PostgreSQL implementation,
//! and the per-entity repositories.
//!
//! Core services talk to [`CredentialStore`] only. The production
//! implementation is [`PgCredentialStore`] over a connection pool; tests use
//! an in-memory implementation from `test_utils`.

pub mod errors;
pub mod handlers;
pub mod models;
pub mod store;

pub use store::PgCredentialStore;

use crate::db::errors::Result;
use crate::db::models::{
    permissions::PermissionDBResponse,
    roles::{RoleCreateDBRequest, RoleDBResponse, RoleDetailDBResponse, RoleFilter, RoleGrant, RoleRemoval, RoleUpdateDBRequest},
    users::UserDBResponse,
};
use crate::types::{PermissionId, RoleId, UserId};
use async_trait::async_trait;

/// The authoritative store of users, roles, permissions and their
/// associations.
///
/// Every method is a suspension point (network I/O on the PostgreSQL
/// implementation); none of them retry.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by unique name (login path).
    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<UserDBResponse>>;

    /// Look up a user by id (resolution paths).
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>>;

    /// Enabled, non-deleted roles among `role_ids` with their permission ids.
    async fn find_active_grants(&self, role_ids: &[RoleId]) -> Result<Vec<RoleGrant>>;

    /// Resolve permission records by id.
    async fn find_permissions(&self, ids: &[PermissionId]) -> Result<Vec<PermissionDBResponse>>;

    /// Exact-match role lookup among non-deleted roles.
    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleDBResponse>>;

    /// Insert a role and its permission associations atomically.
    async fn create_role(&self, request: &RoleCreateDBRequest) -> Result<RoleDBResponse>;

    /// Filtered, paginated role listing plus the total matching count.
    async fn list_roles(&self, filter: &RoleFilter) -> Result<(Vec<RoleDBResponse>, i64)>;

    /// A non-deleted role with its permission ids.
    async fn find_role(&self, id: RoleId) -> Result<Option<RoleDetailDBResponse>>;

    /// Apply a patch; returns `None` when no live role matches.
    ///
    /// A patch carrying `permission_ids` replaces the full association set.
    async fn update_role(&self, id: RoleId, request: &RoleUpdateDBRequest) -> Result<Option<RoleDBResponse>>;

    /// Users currently assigned to a role.
    async fn assigned_user_ids(&self, role_id: RoleId) -> Result<Vec<UserId>>;

    /// Guarded soft delete of a batch of roles (see [`RoleRemoval`]).
    async fn remove_roles(&self, ids: &[RoleId]) -> Result<RoleRemoval>;
}
