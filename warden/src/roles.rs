//! Role administration: lifecycle, permission assignment and the cache
//! invalidation that keeps per-user permission sets honest.
//!
//! Guard rails owned here:
//! - the default administrator role (id 1 or the configured name) cannot be
//!   modified or deleted through this path;
//! - a live role name is unique (case-sensitive exact match);
//! - a role with assigned users cannot be deleted, and deletion is always a
//!   soft delete;
//! - a successful update that touched `disabled` or the permission set
//!   deletes the permission-cache entry of every assigned user.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::instrument;

use crate::{
    cache::{keys, Cache},
    config::Config,
    db::models::roles::{RoleCreateDBRequest, RoleDBResponse, RoleDetailDBResponse, RoleFilter, RoleRemoval, RoleUpdateDBRequest},
    db::CredentialStore,
    errors::{Denial, Outcome, Result},
    types::{RoleId, DEFAULT_ADMIN_ROLE_ID},
    AppState,
};

pub struct RoleAdmin {
    store: Arc<dyn CredentialStore>,
    cache: Cache,
    config: Config,
}

impl RoleAdmin {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            cache: state.cache.clone(),
            config: state.config.clone(),
        }
    }

    fn is_default_admin_role(&self, id: RoleId, name: &str) -> bool {
        id == DEFAULT_ADMIN_ROLE_ID || name == self.config.auth.default_role_name
    }

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    pub async fn create(&self, request: &RoleCreateDBRequest) -> Result<Outcome<RoleDBResponse>> {
        if self.store.find_role_by_name(&request.name).await?.is_some() {
            return Ok(Err(Denial::conflict("The name already exists")));
        }

        let role = self.store.create_role(request).await?;
        Ok(Ok(role))
    }

    #[instrument(skip(self, filter), err)]
    pub async fn find_all(&self, filter: &RoleFilter) -> Result<(Vec<RoleDBResponse>, i64)> {
        Ok(self.store.list_roles(filter).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn find_one(&self, id: RoleId) -> Result<Outcome<RoleDetailDBResponse>> {
        match self.store.find_role(id).await? {
            Some(role) => Ok(Ok(role)),
            None => Ok(Err(Denial::not_found(format!("No role found for id: {id}")))),
        }
    }

    /// Apply a patch to a role.
    ///
    /// The default administrator role is rejected before anything else, so
    /// the outcome does not depend on patch content. When the patch carries
    /// a permission set it replaces the whole association set (empty clears
    /// all).
    #[instrument(skip(self, patch), err)]
    pub async fn update(&self, id: RoleId, patch: &RoleUpdateDBRequest) -> Result<Outcome<()>> {
        if id == DEFAULT_ADMIN_ROLE_ID {
            return Ok(Err(Denial::not_acceptable("The default administrator role cannot be modified")));
        }

        let Some(existing) = self.store.find_role(id).await? else {
            return Ok(Err(Denial::not_found(format!("No role found for id: {id}"))));
        };
        if self.is_default_admin_role(id, &existing.name) {
            return Ok(Err(Denial::not_acceptable("The default administrator role cannot be modified")));
        }

        if let Some(name) = &patch.name {
            if let Some(other) = self.store.find_role_by_name(name).await? {
                if other.id != id {
                    return Ok(Err(Denial::conflict("The name already exists")));
                }
            }
        }

        if self.store.update_role(id, patch).await?.is_none() {
            return Ok(Err(Denial::not_found(format!("No role found for id: {id}"))));
        }

        // Only patches that can change what the role grants invalidate the
        // assigned users' permission caches
        if patch.touches_grants() {
            for user_id in self.store.assigned_user_ids(id).await? {
                self.cache.delete(&keys::permissions_key(user_id)).await?;
            }
        }

        Ok(Ok(()))
    }

    #[instrument(skip(self), err)]
    pub async fn remove(&self, id: RoleId) -> Result<Outcome<()>> {
        self.batch_remove(&[id]).await
    }

    /// Soft-delete a batch of roles, all or nothing.
    ///
    /// `NotFound` when the live targets do not account for every requested
    /// id, `NotAcceptable` when any target still has a user assigned or is
    /// the default administrator role. The store folds the assignment check
    /// and the delete into one transaction.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn batch_remove(&self, ids: &[RoleId]) -> Result<Outcome<()>> {
        // Duplicate ids would skew the row-count comparison below
        let mut seen = HashSet::new();
        let ids: Vec<RoleId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        if ids.contains(&DEFAULT_ADMIN_ROLE_ID) {
            return Ok(Err(Denial::not_acceptable("The default administrator role cannot be removed")));
        }
        if let Some(admin_role) = self.store.find_role_by_name(&self.config.auth.default_role_name).await? {
            if ids.contains(&admin_role.id) {
                return Ok(Err(Denial::not_acceptable("The default administrator role cannot be removed")));
            }
        }

        match self.store.remove_roles(&ids).await? {
            RoleRemoval::Removed => Ok(Ok(())),
            RoleRemoval::NotFound => Ok(Err(Denial::not_found("Some roles do not exist or are already deleted"))),
            RoleRemoval::InUse => Ok(Err(Denial::not_acceptable("The role is assigned to users and cannot be removed"))),
        }
    }
}
