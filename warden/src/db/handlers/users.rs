//! Database repository for users.
//!
//! The session and resolution paths only read accounts; the single write
//! (`create`, `update_password`) exists for initial-admin seeding at startup.

use crate::db::{
    errors::Result,
    models::users::{UserCreateDBRequest, UserDBResponse},
};
use crate::types::{abbrev_uuid, RoleId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, PgConnection};
use tracing::instrument;

// Database entity model, with the ordered role assignment aggregated in
#[derive(Debug, Clone, FromRow)]
struct User {
    pub id: UserId,
    pub user_name: String,
    pub password_hash: String,
    pub nick_name: Option<String>,
    pub avatar: Option<String>,
    pub role_ids: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserDBResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_name: user.user_name,
            nick_name: user.nick_name,
            avatar: user.avatar,
            password_hash: user.password_hash,
            role_ids: user.role_ids,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

const SELECT_USER: &str = r#"
    SELECT u.id, u.user_name, u.password_hash, u.nick_name, u.avatar, u.created_at, u.updated_at,
           COALESCE(ARRAY_AGG(ur.role_id ORDER BY ur.role_id) FILTER (WHERE ur.role_id IS NOT NULL), ARRAY[]::INTEGER[]) AS role_ids
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
"#;

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>(&format!("{SELECT_USER} WHERE u.id = $1 GROUP BY u.id"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(UserDBResponse::from))
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_user_name(&mut self, user_name: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>(&format!("{SELECT_USER} WHERE u.user_name = $1 GROUP BY u.id"))
            .bind(user_name)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(UserDBResponse::from))
    }

    #[instrument(skip(self, request), fields(user_name = %request.user_name), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut tx = self.db.begin().await?;

        let (id, created_at, updated_at): (UserId, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO users (user_name, password_hash, nick_name, avatar)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(&request.user_name)
        .bind(&request.password_hash)
        .bind(&request.nick_name)
        .bind(&request.avatar)
        .fetch_one(&mut *tx)
        .await?;

        for role_id in &request.role_ids {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(id)
                .bind(role_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(UserDBResponse {
            id,
            user_name: request.user_name.clone(),
            nick_name: request.nick_name.clone(),
            avatar: request.avatar.clone(),
            password_hash: request.password_hash.clone(),
            role_ids: request.role_ids.clone(),
            created_at,
            updated_at,
        })
    }

    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update_password(&mut self, id: UserId, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}
