//! Effective-permission resolution and the per-user permission cache.
//!
//! Two entry points share one resolution pipeline (active roles → flattened,
//! deduplicated permission ids → permission records):
//!
//! - [`PermissionResolver::get_user_info`] produces the profile payload
//!   (role names, permission codes, menu tree) for the frontend.
//! - [`PermissionResolver::find_user_permissions`] answers authorization
//!   checks through a read-through cache keyed per user.
//!
//! The configured default administrator bypasses role aggregation for
//! permissions: it is granted the wildcard permission directly, and that
//! grant is derived on every call, never cached.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    auth::menu::{build_menu_tree, MenuNode},
    cache::{keys, Cache},
    config::Config,
    db::models::{
        permissions::{PermissionDBResponse, PermissionKind},
        roles::RoleGrant,
    },
    db::CredentialStore,
    errors::{Error, Result},
    types::{PermissionId, RoleId, UserId},
};

/// Profile payload for an authenticated user.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserInfo {
    /// Display name (nick name, falling back to the user name)
    pub name: String,
    pub avatar: String,
    /// Names of the user's enabled roles
    pub roles: Vec<String>,
    /// Effective permission codes
    pub permissions: Vec<String>,
    /// Navigation menu derived from non-button permission records
    pub menus: Vec<MenuNode>,
}

pub struct PermissionResolver {
    store: Arc<dyn CredentialStore>,
    cache: Cache,
    config: Config,
}

impl PermissionResolver {
    pub fn new(state: &crate::AppState) -> Self {
        Self {
            store: state.store.clone(),
            cache: state.cache.clone(),
            config: state.config.clone(),
        }
    }

    fn is_default_administrator(&self, user_name: &str) -> bool {
        user_name == self.config.admin_user_name
    }

    /// Shared resolution pipeline: enabled roles, then the records behind
    /// their flattened, deduplicated permission ids.
    async fn permissions_for_roles(&self, role_ids: &[RoleId]) -> Result<(Vec<RoleGrant>, Vec<PermissionDBResponse>)> {
        let grants = self.store.find_active_grants(role_ids).await?;

        let mut seen = HashSet::new();
        let mut permission_ids: Vec<PermissionId> = Vec::new();
        for grant in &grants {
            for &id in &grant.permission_ids {
                if seen.insert(id) {
                    permission_ids.push(id);
                }
            }
        }

        let records = if permission_ids.is_empty() {
            Vec::new()
        } else {
            self.store.find_permissions(&permission_ids).await?
        };

        Ok((grants, records))
    }

    /// Resolve the profile payload for a user.
    ///
    /// A missing user here is a data-integrity anomaly, not a routine login
    /// failure: by the time this runs the caller held a validated session.
    /// It therefore propagates as a hard error.
    #[instrument(skip(self), err)]
    pub async fn get_user_info(&self, user_id: UserId) -> Result<UserInfo> {
        let user = self.store.find_user_by_id(user_id).await?.ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })?;

        let mut info = UserInfo {
            name: user.nick_name.clone().unwrap_or_else(|| user.user_name.clone()),
            avatar: user.avatar.clone().unwrap_or_default(),
            roles: Vec::new(),
            permissions: Vec::new(),
            menus: Vec::new(),
        };

        let super_permission = self.config.auth.super_permission.clone();
        if self.is_default_administrator(&user.user_name) {
            info.permissions = vec![super_permission.clone()];
        }
        if user.role_ids.is_empty() {
            return Ok(info);
        }

        let (grants, records) = self.permissions_for_roles(&user.role_ids).await?;
        if grants.is_empty() {
            return Ok(info);
        }
        info.roles = grants.iter().map(|grant| grant.name.clone()).collect();

        if records.is_empty() {
            return Ok(info);
        }

        // The wildcard override, when present, wins over the aggregate
        if !info.permissions.contains(&super_permission) {
            info.permissions = records.iter().map(|record| record.code.clone()).collect();
        }

        let menu_records: Vec<PermissionDBResponse> =
            records.into_iter().filter(|record| record.kind != PermissionKind::Button).collect();
        info.menus = build_menu_tree(&menu_records);

        Ok(info)
    }

    /// Effective permission codes for a user, through the per-user cache.
    ///
    /// A non-empty cached set short-circuits all store work. Empty results
    /// are never cached (so a later role grant is not masked), and the
    /// administrator wildcard is derived rather than stored. Concurrent
    /// misses may each recompute and rewrite the entry; all writers compute
    /// the same value from the same source state, so no single-flight lock
    /// is taken.
    #[instrument(skip(self), err)]
    pub async fn find_user_permissions(&self, user_id: UserId) -> Result<Vec<String>> {
        let cache_key = keys::permissions_key(user_id);

        let cached = self.cache.set_members(&cache_key).await?;
        if !cached.is_empty() {
            return Ok(cached);
        }

        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Ok(Vec::new());
        };
        if user.role_ids.is_empty() {
            return Ok(Vec::new());
        }

        if self.is_default_administrator(&user.user_name) {
            return Ok(vec![self.config.auth.super_permission.clone()]);
        }

        let (_, records) = self.permissions_for_roles(&user.role_ids).await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let codes: Vec<String> = records.iter().map(|record| record.code.clone()).collect();
        self.cache
            .set_add(&cache_key, &codes, self.config.auth.jwt_expires_in)
            .await?;

        Ok(codes)
    }

    /// Gate an operation on a permission code. The configured wildcard
    /// satisfies every check.
    #[instrument(skip(self), err)]
    pub async fn authorize(&self, user_id: UserId, permission: &str) -> Result<()> {
        let permissions = self.find_user_permissions(user_id).await?;
        let super_permission = &self.config.auth.super_permission;

        if permissions.iter().any(|p| p == permission || p == super_permission) {
            return Ok(());
        }

        Err(Error::InsufficientPermissions {
            permission: permission.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_state;

    #[tokio::test]
    async fn test_get_user_info_missing_user_is_hard_not_found() {
        let (state, _store) = create_test_state();
        let resolver = PermissionResolver::new(&state);

        let err = resolver.get_user_info(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_user_info_administrator_gets_wildcard() {
        let (state, store) = create_test_state();
        let p = store.add_permission("role:list", PermissionKind::Api);
        let role = store.add_role("ops", false, vec![p]);
        // "admin" is the configured default administrator identity
        let user_id = store.add_user("admin", "hash", vec![role]);

        // The override wins even though the role resolves real permissions;
        // roles and menus still derive from the assignment
        let info = PermissionResolver::new(&state).get_user_info(user_id).await.unwrap();
        assert_eq!(info.permissions, vec!["*:*:*".to_string()]);
        assert_eq!(info.roles, vec!["ops".to_string()]);
        assert_eq!(info.menus.len(), 1);
    }

    #[tokio::test]
    async fn test_get_user_info_without_roles_is_seeded_only() {
        let (state, store) = create_test_state();
        let user_id = store.add_user_with_profile("bob", "hash", vec![], Some("Bobby"), Some("/a.png"));

        let info = PermissionResolver::new(&state).get_user_info(user_id).await.unwrap();
        assert_eq!(info.name, "Bobby");
        assert_eq!(info.avatar, "/a.png");
        assert!(info.roles.is_empty());
        assert!(info.permissions.is_empty());
        assert!(info.menus.is_empty());
    }

    #[tokio::test]
    async fn test_get_user_info_aggregates_and_builds_menus() {
        let (state, store) = create_test_state();
        let parent = store.add_permission("dashboard", PermissionKind::Menu);
        let child = store.add_permission_with("dashboard:users", PermissionKind::Menu, Some(parent), Some("/users"), 1);
        let button = store.add_permission("user:create", PermissionKind::Button);
        let role_a = store.add_role("viewer", false, vec![parent, child]);
        let role_b = store.add_role("editor", false, vec![child, button]);
        let user_id = store.add_user("carol", "hash", vec![role_a, role_b]);

        let info = PermissionResolver::new(&state).get_user_info(user_id).await.unwrap();

        assert_eq!(info.roles, vec!["viewer".to_string(), "editor".to_string()]);
        // Deduplicated across roles, buttons included in permissions
        let mut permissions = info.permissions.clone();
        permissions.sort();
        assert_eq!(permissions, vec!["dashboard", "dashboard:users", "user:create"]);
        // ...but excluded from the menu tree
        assert_eq!(info.menus.len(), 1);
        assert_eq!(info.menus[0].children.len(), 1);
        assert_eq!(info.menus[0].children[0].path.as_deref(), Some("/users"));
    }

    #[tokio::test]
    async fn test_get_user_info_skips_disabled_roles() {
        let (state, store) = create_test_state();
        let p = store.add_permission("user:list", PermissionKind::Api);
        let disabled = store.add_role("dormant", true, vec![p]);
        let user_id = store.add_user("dave", "hash", vec![disabled]);

        let info = PermissionResolver::new(&state).get_user_info(user_id).await.unwrap();
        assert!(info.roles.is_empty());
        assert!(info.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_find_user_permissions_deduplicates() {
        let (state, store) = create_test_state();
        let p1 = store.add_permission("p1", PermissionKind::Api);
        let p2 = store.add_permission("p2", PermissionKind::Api);
        let p3 = store.add_permission("p3", PermissionKind::Api);
        let r1 = store.add_role("r1", false, vec![p1, p2]);
        let r2 = store.add_role("r2", false, vec![p2, p3]);
        let user_id = store.add_user("erin", "hash", vec![r1, r2]);

        let mut permissions = PermissionResolver::new(&state).find_user_permissions(user_id).await.unwrap();
        permissions.sort();
        assert_eq!(permissions, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_find_user_permissions_cache_hit_skips_source() {
        let (state, store) = create_test_state();
        let p1 = store.add_permission("p1", PermissionKind::Api);
        let role = store.add_role("r1", false, vec![p1]);
        let user_id = store.add_user("frank", "hash", vec![role]);

        let resolver = PermissionResolver::new(&state);
        let first = resolver.find_user_permissions(user_id).await.unwrap();
        assert_eq!(first, vec!["p1"]);

        // Mutate the source of truth; within the TTL the cached set must win
        let p2 = store.add_permission("p2", PermissionKind::Api);
        store.set_role_permissions(role, vec![p1, p2]);

        let second = resolver.find_user_permissions(user_id).await.unwrap();
        assert_eq!(second, vec!["p1"]);

        // Explicit invalidation exposes the new grant
        state.cache.delete(&keys::permissions_key(user_id)).await.unwrap();
        let mut third = resolver.find_user_permissions(user_id).await.unwrap();
        third.sort();
        assert_eq!(third, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_find_user_permissions_never_caches_empty() {
        let (state, store) = create_test_state();
        let role = store.add_role("bare", false, vec![]);
        let user_id = store.add_user("grace", "hash", vec![role]);

        let resolver = PermissionResolver::new(&state);
        assert!(resolver.find_user_permissions(user_id).await.unwrap().is_empty());

        // A role grant becomes visible immediately because nothing was cached
        let p = store.add_permission("p1", PermissionKind::Api);
        store.set_role_permissions(role, vec![p]);
        assert_eq!(resolver.find_user_permissions(user_id).await.unwrap(), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_find_user_permissions_admin_wildcard_never_cached() {
        let (state, store) = create_test_state();
        let p = store.add_permission("p1", PermissionKind::Api);
        let role = store.add_role("ops", false, vec![p]);
        let user_id = store.add_user("admin", "hash", vec![role]);

        let resolver = PermissionResolver::new(&state);
        assert_eq!(resolver.find_user_permissions(user_id).await.unwrap(), vec!["*:*:*"]);
        assert!(state
            .cache
            .set_members(&keys::permissions_key(user_id))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_find_user_permissions_unknown_or_roleless_user_is_empty() {
        let (state, store) = create_test_state();
        let user_id = store.add_user("henry", "hash", vec![]);

        let resolver = PermissionResolver::new(&state);
        assert!(resolver.find_user_permissions(uuid::Uuid::new_v4()).await.unwrap().is_empty());
        assert!(resolver.find_user_permissions(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorize() {
        let (state, store) = create_test_state();
        let p = store.add_permission("role:list", PermissionKind::Api);
        let role = store.add_role("ops", false, vec![p]);
        let user_id = store.add_user("iris", "hash", vec![role]);
        let admin_id = store.add_user("admin", "hash", vec![role]);

        let resolver = PermissionResolver::new(&state);
        resolver.authorize(user_id, "role:list").await.unwrap();
        let err = resolver.authorize(user_id, "role:remove").await.unwrap_err();
        assert!(matches!(err, Error::InsufficientPermissions { .. }));

        // The wildcard satisfies every check
        resolver.authorize(admin_id, "role:remove").await.unwrap();
    }
}
