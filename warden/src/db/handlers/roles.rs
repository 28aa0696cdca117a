//! Database repository for roles and their permission associations.
//!
//! Deletion is always a soft delete (`deleted = TRUE`); a soft-deleted role
//! is invisible to every query here and cannot be resurrected.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::roles::{RoleCreateDBRequest, RoleDBResponse, RoleDetailDBResponse, RoleFilter, RoleGrant, RoleRemoval, RoleUpdateDBRequest, SortOrder},
};
use crate::types::{PermissionId, RoleId, UserId};
use sqlx::{Connection, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

const ROLE_COLUMNS: &str = "id, name, description, disabled, created_at, updated_at";

pub struct Roles<'c> {
    db: &'c mut PgConnection,
}

/// Append the filter conditions shared by `list` and `count`.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &RoleFilter) {
    if let Some(disabled) = filter.disabled {
        qb.push(" AND disabled = ").push_bind(disabled);
    }
    if let Some(keyword) = &filter.keyword {
        qb.push(" AND name ILIKE ").push_bind(format!("%{keyword}%"));
    }
    if let Some(begin_time) = filter.begin_time {
        qb.push(" AND created_at >= ").push_bind(begin_time);
    }
    if let Some(end_time) = filter.end_time {
        qb.push(" AND created_at <= ").push_bind(end_time);
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Roles<'c> {
    type CreateRequest = RoleCreateDBRequest;
    type UpdateRequest = RoleUpdateDBRequest;
    type Response = RoleDBResponse;
    type Id = RoleId;
    type Filter = RoleFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let role = sqlx::query_as::<_, RoleDBResponse>(&format!(
            "INSERT INTO roles (name, description, disabled) VALUES ($1, $2, $3) RETURNING {ROLE_COLUMNS}"
        ))
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.disabled)
        .fetch_one(&mut *tx)
        .await?;

        for permission_id in &request.permission_ids {
            sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
                .bind(role.id)
                .bind(permission_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(role)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let role = sqlx::query_as::<_, RoleDBResponse>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 AND NOT deleted"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(role)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut qb = QueryBuilder::new(format!("SELECT {ROLE_COLUMNS} FROM roles WHERE NOT deleted"));
        push_filter(&mut qb, filter);
        qb.push(match filter.sort {
            SortOrder::Asc => " ORDER BY created_at ASC",
            SortOrder::Desc => " ORDER BY created_at DESC",
        });
        qb.push(" LIMIT ").push_bind(filter.limit);
        qb.push(" OFFSET ").push_bind(filter.skip);

        let roles = qb.build_query_as::<RoleDBResponse>().fetch_all(&mut *self.db).await?;

        Ok(roles)
    }

    /// Soft delete, unguarded. Callers needing the assignment guard use
    /// [`Roles::remove_guarded`] instead.
    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("UPDATE roles SET deleted = TRUE, updated_at = NOW() WHERE id = $1 AND NOT deleted")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let role = sqlx::query_as::<_, RoleDBResponse>(&format!(
            r#"
            UPDATE roles SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                disabled = COALESCE($4, disabled),
                updated_at = NOW()
            WHERE id = $1 AND NOT deleted
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.disabled)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

        // Full replace of the association set when the patch carries one; an
        // empty vec clears all associations.
        if let Some(permission_ids) = &request.permission_ids {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            for permission_id in permission_ids {
                sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(permission_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(role)
    }
}

impl<'c> Roles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Exact-match lookup among non-deleted roles (name uniqueness checks).
    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, name: &str) -> Result<Option<RoleDBResponse>> {
        let role = sqlx::query_as::<_, RoleDBResponse>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1 AND NOT deleted"))
            .bind(name)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(role)
    }

    /// Total row count for a filter, ignoring its pagination.
    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &RoleFilter) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM roles WHERE NOT deleted");
        push_filter(&mut qb, filter);

        let total = qb.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;

        Ok(total)
    }

    /// A role with its permission ids, for the detail view.
    #[instrument(skip(self), err)]
    pub async fn get_detail(&mut self, id: RoleId) -> Result<Option<RoleDetailDBResponse>> {
        let Some(role) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let permission_ids =
            sqlx::query_scalar::<_, PermissionId>("SELECT permission_id FROM role_permissions WHERE role_id = $1 ORDER BY permission_id")
                .bind(id)
                .fetch_all(&mut *self.db)
                .await?;

        Ok(Some(RoleDetailDBResponse {
            id: role.id,
            name: role.name,
            description: role.description,
            disabled: role.disabled,
            permission_ids,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }))
    }

    /// Enabled, non-deleted roles among `ids` with their permission ids
    /// aggregated in. Disabled and deleted roles simply do not show up.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn get_active_grants(&mut self, ids: &[RoleId]) -> Result<Vec<RoleGrant>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let grants = sqlx::query_as::<_, RoleGrant>(
            r#"
            SELECT r.id, r.name,
                   COALESCE(ARRAY_AGG(rp.permission_id ORDER BY rp.permission_id) FILTER (WHERE rp.permission_id IS NOT NULL), ARRAY[]::INTEGER[]) AS permission_ids
            FROM roles r
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            WHERE r.id = ANY($1) AND NOT r.disabled AND NOT r.deleted
            GROUP BY r.id
            ORDER BY r.id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(grants)
    }

    /// Users currently assigned to a role (cache invalidation targets and
    /// the deletion guard).
    #[instrument(skip(self), err)]
    pub async fn assigned_user_ids(&mut self, role_id: RoleId) -> Result<Vec<UserId>> {
        let user_ids = sqlx::query_scalar::<_, UserId>("SELECT user_id FROM user_roles WHERE role_id = $1")
            .bind(role_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(user_ids)
    }

    /// Guarded soft delete of a batch of roles.
    ///
    /// The existence check, the assignment guard and the delete all run in
    /// one transaction with the target rows locked, so a role cannot gain an
    /// assignment between the check and the delete.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn remove_guarded(&mut self, ids: &[RoleId]) -> Result<RoleRemoval> {
        let mut tx = self.db.begin().await?;

        let live_ids = sqlx::query_scalar::<_, RoleId>("SELECT id FROM roles WHERE id = ANY($1) AND NOT deleted FOR UPDATE")
            .bind(ids)
            .fetch_all(&mut *tx)
            .await?;

        if live_ids.len() != ids.len() {
            return Ok(RoleRemoval::NotFound);
        }

        let assigned = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_roles WHERE role_id = ANY($1)")
            .bind(ids)
            .fetch_one(&mut *tx)
            .await?;

        if assigned > 0 {
            return Ok(RoleRemoval::InUse);
        }

        sqlx::query("UPDATE roles SET deleted = TRUE, updated_at = NOW() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(RoleRemoval::Removed)
    }
}
