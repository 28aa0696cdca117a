//! PostgreSQL-backed [`CredentialStore`].

use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::{
    errors::{DbError, Result},
    handlers::{Permissions, Repository, Roles, Users},
    models::{
        permissions::PermissionDBResponse,
        roles::{RoleCreateDBRequest, RoleDBResponse, RoleDetailDBResponse, RoleFilter, RoleGrant, RoleRemoval, RoleUpdateDBRequest},
        users::UserDBResponse,
    },
    CredentialStore,
};
use crate::types::{PermissionId, RoleId, UserId};

/// Credential store over a PostgreSQL connection pool, delegating to the
/// per-entity repositories.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Users::new(&mut conn).get_by_user_name(user_name).await
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Users::new(&mut conn).get_by_id(id).await
    }

    async fn find_active_grants(&self, role_ids: &[RoleId]) -> Result<Vec<RoleGrant>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Roles::new(&mut conn).get_active_grants(role_ids).await
    }

    async fn find_permissions(&self, ids: &[PermissionId]) -> Result<Vec<PermissionDBResponse>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Permissions::new(&mut conn).get_by_ids(ids).await
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleDBResponse>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Roles::new(&mut conn).get_by_name(name).await
    }

    async fn create_role(&self, request: &RoleCreateDBRequest) -> Result<RoleDBResponse> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Roles::new(&mut conn).create(request).await
    }

    async fn list_roles(&self, filter: &RoleFilter) -> Result<(Vec<RoleDBResponse>, i64)> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        let mut repo = Roles::new(&mut conn);
        let roles = repo.list(filter).await?;
        let total = repo.count(filter).await?;
        Ok((roles, total))
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleDetailDBResponse>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Roles::new(&mut conn).get_detail(id).await
    }

    async fn update_role(&self, id: RoleId, request: &RoleUpdateDBRequest) -> Result<Option<RoleDBResponse>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        match Roles::new(&mut conn).update(id, request).await {
            Ok(role) => Ok(Some(role)),
            Err(DbError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn assigned_user_ids(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Roles::new(&mut conn).assigned_user_ids(role_id).await
    }

    async fn remove_roles(&self, ids: &[RoleId]) -> Result<RoleRemoval> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        Roles::new(&mut conn).remove_guarded(ids).await
    }
}
