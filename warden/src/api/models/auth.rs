//! API request/response models for authentication.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{menu::MenuNode, permissions::UserInfo};

/// Rendered captcha challenge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CaptchaResponse {
    /// Inline-encodable image data URI; the expected text stays server-side
    pub captcha: String,
}

/// Request body for logging in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "alice")]
    pub user_name: String,
    pub password: String,
    /// Answer to the captcha challenge issued to this requester
    pub captcha: String,
}

/// Successful login: the session token to present as a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

/// Profile payload for the authenticated user.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserInfoResponse {
    pub name: String,
    pub avatar: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub menus: Vec<MenuNode>,
}

impl From<UserInfo> for UserInfoResponse {
    fn from(info: UserInfo) -> Self {
        Self {
            name: info.name,
            avatar: info.avatar,
            roles: info.roles,
            permissions: info.permissions,
            menus: info.menus,
        }
    }
}
