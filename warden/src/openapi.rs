//! OpenAPI documentation assembly.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::handlers;
use crate::api::models::{
    auth::{CaptchaResponse, LoginRequest, LoginResponse, LogoutResponse, UserInfoResponse},
    pagination::PaginatedResponse,
    roles::{RoleBatchRemove, RoleCreate, RoleDetailResponse, RoleResponse, RoleUpdate},
};
use crate::auth::menu::MenuNode;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "warden",
        description = "Authentication and role-based access control for multi-user admin applications"
    ),
    paths(
        handlers::auth::get_captcha,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::get_user_info,
        handlers::roles::list_roles,
        handlers::roles::create_role,
        handlers::roles::get_role,
        handlers::roles::update_role,
        handlers::roles::remove_role,
        handlers::roles::batch_remove_roles,
    ),
    components(schemas(
        CaptchaResponse,
        LoginRequest,
        LoginResponse,
        LogoutResponse,
        UserInfoResponse,
        MenuNode,
        RoleCreate,
        RoleUpdate,
        RoleBatchRemove,
        RoleResponse,
        RoleDetailResponse,
        PaginatedResponse<RoleResponse>,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "authentication", description = "Captcha, login and session lifecycle"),
        (name = "roles", description = "Role administration"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
