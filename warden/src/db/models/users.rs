//! Database models for users.
//!
//! User lifecycle belongs to the credential store; this core reads accounts
//! for login and permission resolution and only writes during initial-admin
//! seeding.

use crate::types::{RoleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User record as stored, including the ordered role assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDBResponse {
    pub id: UserId,
    pub user_name: String,
    pub nick_name: Option<String>,
    pub avatar: Option<String>,
    /// Argon2 PHC string; opaque to everything but password verification
    pub password_hash: String,
    pub role_ids: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a user (initial-admin seeding only).
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub user_name: String,
    pub password_hash: String,
    pub nick_name: Option<String>,
    pub avatar: Option<String>,
    pub role_ids: Vec<RoleId>,
}
