//! Test helpers: an in-memory credential store, a ready-made configuration
//! and application state.
//!
//! The in-memory store implements the same [`CredentialStore`] seam as the
//! PostgreSQL store, with every guard evaluated under a single lock, so the
//! session, resolution and role-administration logic can be exercised
//! hermetically.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::{
    auth::current_user::RequestContext,
    cache::{self, keys, Cache},
    config::Config,
    db::{
        errors::Result,
        models::{
            permissions::{PermissionDBResponse, PermissionKind},
            roles::{RoleCreateDBRequest, RoleDBResponse, RoleDetailDBResponse, RoleFilter, RoleGrant, RoleRemoval, RoleUpdateDBRequest, SortOrder},
            users::UserDBResponse,
        },
        CredentialStore,
    },
    types::{PermissionId, RoleId, UserId, DEFAULT_ADMIN_ROLE_ID},
    AppState,
};

#[derive(Debug, Clone)]
struct StoredRole {
    id: RoleId,
    name: String,
    description: Option<String>,
    disabled: bool,
    deleted: bool,
    permission_ids: Vec<PermissionId>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl StoredRole {
    fn to_response(&self) -> RoleDBResponse {
        RoleDBResponse {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            disabled: self.disabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug)]
struct Inner {
    users: Vec<UserDBResponse>,
    roles: Vec<StoredRole>,
    permissions: Vec<PermissionDBResponse>,
    next_role_id: RoleId,
    next_permission_id: PermissionId,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            roles: Vec::new(),
            permissions: Vec::new(),
            // Role id 1 is reserved for the default administrator role
            next_role_id: DEFAULT_ADMIN_ROLE_ID + 1,
            next_permission_id: 1,
        }
    }
}

/// In-memory [`CredentialStore`] double.
#[derive(Debug, Default)]
pub struct MemCredentialStore {
    inner: Mutex<Inner>,
}

impl MemCredentialStore {
    pub fn add_user(&self, user_name: &str, password_hash: &str, role_ids: Vec<RoleId>) -> UserId {
        self.add_user_with_profile(user_name, password_hash, role_ids, None, None)
    }

    pub fn add_user_with_profile(
        &self,
        user_name: &str,
        password_hash: &str,
        role_ids: Vec<RoleId>,
        nick_name: Option<&str>,
        avatar: Option<&str>,
    ) -> UserId {
        let now = Utc::now();
        let user = UserDBResponse {
            id: uuid::Uuid::new_v4(),
            user_name: user_name.to_string(),
            nick_name: nick_name.map(str::to_string),
            avatar: avatar.map(str::to_string),
            password_hash: password_hash.to_string(),
            role_ids,
            created_at: now,
            updated_at: now,
        };
        let id = user.id;
        self.inner.lock().unwrap().users.push(user);
        id
    }

    pub fn add_role(&self, name: &str, disabled: bool, permission_ids: Vec<PermissionId>) -> RoleId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_role_id;
        inner.next_role_id += 1;
        push_role(&mut inner, id, name, disabled, permission_ids);
        id
    }

    pub fn add_role_with_id(&self, id: RoleId, name: &str, disabled: bool, permission_ids: Vec<PermissionId>) {
        let mut inner = self.inner.lock().unwrap();
        push_role(&mut inner, id, name, disabled, permission_ids);
    }

    pub fn rename_role(&self, id: RoleId, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(role) = inner.roles.iter_mut().find(|role| role.id == id) {
            role.name = name.to_string();
        }
    }

    pub fn mark_role_deleted(&self, id: RoleId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(role) = inner.roles.iter_mut().find(|role| role.id == id) {
            role.deleted = true;
        }
    }

    pub fn set_role_permissions(&self, id: RoleId, permission_ids: Vec<PermissionId>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(role) = inner.roles.iter_mut().find(|role| role.id == id) {
            role.permission_ids = permission_ids;
        }
    }

    pub fn add_permission(&self, code: &str, kind: PermissionKind) -> PermissionId {
        self.add_permission_with(code, kind, None, None, 0)
    }

    pub fn add_permission_with(
        &self,
        code: &str,
        kind: PermissionKind,
        parent_id: Option<PermissionId>,
        path: Option<&str>,
        sort_order: i32,
    ) -> PermissionId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_permission_id;
        inner.next_permission_id += 1;
        inner.permissions.push(PermissionDBResponse {
            id,
            code: code.to_string(),
            name: code.to_string(),
            kind,
            parent_id,
            path: path.map(str::to_string),
            icon: None,
            sort_order,
        });
        id
    }
}

fn push_role(inner: &mut Inner, id: RoleId, name: &str, disabled: bool, permission_ids: Vec<PermissionId>) {
    let now = Utc::now();
    inner.roles.push(StoredRole {
        id,
        name: name.to_string(),
        description: None,
        disabled,
        deleted: false,
        permission_ids,
        created_at: now,
        updated_at: now,
    });
}

#[async_trait::async_trait]
impl CredentialStore for MemCredentialStore {
    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<UserDBResponse>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|user| user.user_name == user_name).cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_active_grants(&self, role_ids: &[RoleId]) -> Result<Vec<RoleGrant>> {
        let inner = self.inner.lock().unwrap();
        let mut grants: Vec<RoleGrant> = inner
            .roles
            .iter()
            .filter(|role| role_ids.contains(&role.id) && !role.disabled && !role.deleted)
            .map(|role| RoleGrant {
                id: role.id,
                name: role.name.clone(),
                permission_ids: role.permission_ids.clone(),
            })
            .collect();
        grants.sort_by_key(|grant| grant.id);
        Ok(grants)
    }

    async fn find_permissions(&self, ids: &[PermissionId]) -> Result<Vec<PermissionDBResponse>> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<PermissionDBResponse> = inner
            .permissions
            .iter()
            .filter(|permission| ids.contains(&permission.id))
            .cloned()
            .collect();
        records.sort_by_key(|permission| (permission.sort_order, permission.id));
        Ok(records)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleDBResponse>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .roles
            .iter()
            .find(|role| !role.deleted && role.name == name)
            .map(StoredRole::to_response))
    }

    async fn create_role(&self, request: &RoleCreateDBRequest) -> Result<RoleDBResponse> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_role_id;
        inner.next_role_id += 1;
        let now = Utc::now();
        inner.roles.push(StoredRole {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            disabled: request.disabled,
            deleted: false,
            permission_ids: request.permission_ids.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(inner.roles.last().unwrap().to_response())
    }

    async fn list_roles(&self, filter: &RoleFilter) -> Result<(Vec<RoleDBResponse>, i64)> {
        let inner = self.inner.lock().unwrap();
        let keyword = filter.keyword.as_ref().map(|keyword| keyword.to_lowercase());

        let mut matching: Vec<&StoredRole> = inner
            .roles
            .iter()
            .filter(|role| !role.deleted)
            .filter(|role| filter.disabled.is_none_or(|disabled| role.disabled == disabled))
            .filter(|role| {
                keyword
                    .as_ref()
                    .is_none_or(|keyword| role.name.to_lowercase().contains(keyword))
            })
            .filter(|role| filter.begin_time.is_none_or(|begin| role.created_at >= begin))
            .filter(|role| filter.end_time.is_none_or(|end| role.created_at <= end))
            .collect();

        matching.sort_by_key(|role| (role.created_at, role.id));
        if filter.sort == SortOrder::Desc {
            matching.reverse();
        }

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.skip.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .map(StoredRole::to_response)
            .collect();

        Ok((page, total))
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<RoleDetailDBResponse>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.roles.iter().find(|role| role.id == id && !role.deleted).map(|role| {
            let mut permission_ids = role.permission_ids.clone();
            permission_ids.sort_unstable();
            RoleDetailDBResponse {
                id: role.id,
                name: role.name.clone(),
                description: role.description.clone(),
                disabled: role.disabled,
                permission_ids,
                created_at: role.created_at,
                updated_at: role.updated_at,
            }
        }))
    }

    async fn update_role(&self, id: RoleId, request: &RoleUpdateDBRequest) -> Result<Option<RoleDBResponse>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(role) = inner.roles.iter_mut().find(|role| role.id == id && !role.deleted) else {
            return Ok(None);
        };

        if let Some(name) = &request.name {
            role.name = name.clone();
        }
        if let Some(description) = &request.description {
            role.description = Some(description.clone());
        }
        if let Some(disabled) = request.disabled {
            role.disabled = disabled;
        }
        if let Some(permission_ids) = &request.permission_ids {
            role.permission_ids = permission_ids.clone();
        }
        role.updated_at = Utc::now();

        Ok(Some(role.to_response()))
    }

    async fn assigned_user_ids(&self, role_id: RoleId) -> Result<Vec<UserId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|user| user.role_ids.contains(&role_id))
            .map(|user| user.id)
            .collect())
    }

    async fn remove_roles(&self, ids: &[RoleId]) -> Result<RoleRemoval> {
        let mut inner = self.inner.lock().unwrap();

        let live: Vec<RoleId> = inner
            .roles
            .iter()
            .filter(|role| ids.contains(&role.id) && !role.deleted)
            .map(|role| role.id)
            .collect();
        if live.len() != ids.len() {
            return Ok(RoleRemoval::NotFound);
        }

        let assigned = inner
            .users
            .iter()
            .any(|user| user.role_ids.iter().any(|role_id| ids.contains(role_id)));
        if assigned {
            return Ok(RoleRemoval::InUse);
        }

        for role in inner.roles.iter_mut().filter(|role| ids.contains(&role.id)) {
            role.deleted = true;
            role.updated_at = Utc::now();
        }

        Ok(RoleRemoval::Removed)
    }
}

/// Configuration suitable for tests: symmetric token signing, defaults
/// everywhere else.
pub fn create_test_config() -> Config {
    Config {
        secret_key: Some("test-secret-key-for-jwt".to_string()),
        ..Config::default()
    }
}

/// Application state over an in-memory credential store and cache.
pub fn create_test_state() -> (AppState, Arc<MemCredentialStore>) {
    let store = Arc::new(MemCredentialStore::default());
    let state = AppState::builder()
        .store(store.clone())
        .cache(cache::connect())
        .config(create_test_config())
        .build();
    (state, store)
}

/// Plant a known captcha answer for a requester, as if it had been issued.
pub async fn seed_captcha(cache: &Cache, ctx: &RequestContext, text: &str) {
    cache
        .set(&keys::captcha_key(&ctx.ip, &ctx.user_agent), text, Duration::from_secs(120))
        .await
        .expect("in-memory cache writes cannot fail");
}
