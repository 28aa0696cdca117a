//! Database repository for permissions.
//!
//! Permission records are reference data maintained outside this core; only
//! lookups are needed here.

use crate::db::{errors::Result, models::permissions::PermissionDBResponse};
use crate::types::PermissionId;
use sqlx::PgConnection;
use tracing::instrument;

const PERMISSION_COLUMNS: &str = "id, code, name, kind, parent_id, path, icon, sort_order";

pub struct Permissions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Permissions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn get_by_ids(&mut self, ids: &[PermissionId]) -> Result<Vec<PermissionDBResponse>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let permissions = sqlx::query_as::<_, PermissionDBResponse>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ANY($1) ORDER BY sort_order, id"
        ))
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(permissions)
    }
}
