use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    api::models::{
        pagination::PaginatedResponse,
        roles::{ListRolesQuery, RoleBatchRemove, RoleCreate, RoleDetailResponse, RoleResponse, RoleUpdate},
    },
    auth::{current_user::CurrentUser, permissions::PermissionResolver},
    errors::Error,
    roles::RoleAdmin,
    types::RoleId,
    AppState,
};

/// Check the caller holds a permission code before touching role state.
async fn authorize(state: &AppState, user: &CurrentUser, permission: &str) -> Result<(), Error> {
    PermissionResolver::new(state).authorize(user.id, permission).await
}

/// List roles with filtering and pagination
#[utoipa::path(
    get,
    path = "/admin/api/v1/roles",
    params(ListRolesQuery),
    tag = "roles",
    responses(
        (status = 200, description = "Roles matching the filter", body = PaginatedResponse<RoleResponse>),
        (status = 403, description = "Missing role:list permission"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_roles(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListRolesQuery>,
) -> Result<Json<PaginatedResponse<RoleResponse>>, Error> {
    authorize(&state, &user, "role:list").await?;

    let filter = query.to_filter();
    let (roles, total) = RoleAdmin::new(&state).find_all(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        roles.into_iter().map(RoleResponse::from).collect(),
        total,
        filter.skip,
        filter.limit,
    )))
}

/// Create a new role
#[utoipa::path(
    post,
    path = "/admin/api/v1/roles",
    request_body = RoleCreate,
    tag = "roles",
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 409, description = "Role name already exists"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_role(State(state): State<AppState>, user: CurrentUser, Json(request): Json<RoleCreate>) -> Result<Response, Error> {
    authorize(&state, &user, "role:create").await?;

    match RoleAdmin::new(&state).create(&request.into()).await? {
        Ok(role) => Ok((StatusCode::CREATED, Json(RoleResponse::from(role))).into_response()),
        Err(denial) => Ok(denial.into_response()),
    }
}

/// Get a role with its permission associations
#[utoipa::path(
    get,
    path = "/admin/api/v1/roles/{id}",
    params(("id" = i32, Path, description = "Role id")),
    tag = "roles",
    responses(
        (status = 200, description = "Role details", body = RoleDetailResponse),
        (status = 404, description = "No such role"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(role_id = id))]
pub async fn get_role(State(state): State<AppState>, user: CurrentUser, Path(id): Path<RoleId>) -> Result<Response, Error> {
    authorize(&state, &user, "role:query").await?;

    match RoleAdmin::new(&state).find_one(id).await? {
        Ok(role) => Ok(Json(RoleDetailResponse::from(role)).into_response()),
        Err(denial) => Ok(denial.into_response()),
    }
}

/// Update a role; a patch carrying `permissions` replaces the full set
#[utoipa::path(
    patch,
    path = "/admin/api/v1/roles/{id}",
    params(("id" = i32, Path, description = "Role id")),
    request_body = RoleUpdate,
    tag = "roles",
    responses(
        (status = 204, description = "Role updated"),
        (status = 404, description = "No such role"),
        (status = 406, description = "Default administrator role is immutable"),
        (status = 409, description = "Role name already exists"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(role_id = id))]
pub async fn update_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<RoleId>,
    Json(request): Json<RoleUpdate>,
) -> Result<Response, Error> {
    authorize(&state, &user, "role:update").await?;

    match RoleAdmin::new(&state).update(id, &request.into()).await? {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(denial) => Ok(denial.into_response()),
    }
}

/// Soft-delete a role with no assigned users
#[utoipa::path(
    delete,
    path = "/admin/api/v1/roles/{id}",
    params(("id" = i32, Path, description = "Role id")),
    tag = "roles",
    responses(
        (status = 204, description = "Role removed"),
        (status = 404, description = "No such role"),
        (status = 406, description = "Role is assigned to users or is the default administrator role"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(role_id = id))]
pub async fn remove_role(State(state): State<AppState>, user: CurrentUser, Path(id): Path<RoleId>) -> Result<Response, Error> {
    authorize(&state, &user, "role:remove").await?;

    match RoleAdmin::new(&state).remove(id).await? {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(denial) => Ok(denial.into_response()),
    }
}

/// Soft-delete a batch of roles, all or nothing
#[utoipa::path(
    post,
    path = "/admin/api/v1/roles/batch-remove",
    request_body = RoleBatchRemove,
    tag = "roles",
    responses(
        (status = 204, description = "Roles removed"),
        (status = 404, description = "At least one role does not exist"),
        (status = 406, description = "At least one role is assigned to users"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn batch_remove_roles(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<RoleBatchRemove>,
) -> Result<Response, Error> {
    authorize(&state, &user, "role:remove").await?;

    if request.ids.is_empty() {
        return Err(Error::BadRequest {
            message: "ids must not be empty".to_string(),
        });
    }

    match RoleAdmin::new(&state).batch_remove(&request.ids).await? {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(denial) => Ok(denial.into_response()),
    }
}
