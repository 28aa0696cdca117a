use axum::{extract::State, response::IntoResponse, response::Response, Json};

use crate::{
    api::models::auth::{CaptchaResponse, LoginRequest, LoginResponse, LogoutResponse, UserInfoResponse},
    auth::{
        captcha,
        current_user::{BearerToken, CurrentUser, RequestContext},
        permissions::PermissionResolver,
        session::SessionManager,
    },
    errors::Error,
    AppState,
};

/// Issue a captcha challenge for the requesting client
#[utoipa::path(
    get,
    path = "/authentication/captcha",
    tag = "authentication",
    responses(
        (status = 200, description = "Rendered captcha challenge", body = CaptchaResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_captcha(State(state): State<AppState>, ctx: RequestContext) -> Result<Json<CaptchaResponse>, Error> {
    let challenge = captcha::issue(&state.cache, state.config.auth.captcha_expires_in, &ctx.ip, &ctx.user_agent).await?;

    Ok(Json(CaptchaResponse { captcha: challenge.image }))
}

/// Login with user name, password and captcha answer
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Captcha, user name or password invalid"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, ctx: RequestContext, Json(request): Json<LoginRequest>) -> Result<Response, Error> {
    let sessions = SessionManager::new(&state);

    match sessions.login(&request.user_name, &request.password, &request.captcha, &ctx).await? {
        Ok(token) => Ok(Json(LoginResponse { token }).into_response()),
        Err(denial) => Ok(denial.into_response()),
    }
}

/// Revoke the presented session token
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Token revoked", body = LogoutResponse),
        (status = 401, description = "No token presented"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, BearerToken(token): BearerToken) -> Result<Json<LogoutResponse>, Error> {
    let sessions = SessionManager::new(&state);
    sessions.logout(&token).await?;

    Ok(Json(LogoutResponse {
        message: "Logout successful".to_string(),
    }))
}

/// Profile, roles, permissions and menu tree for the authenticated user
#[utoipa::path(
    get,
    path = "/authentication/user-info",
    tag = "authentication",
    responses(
        (status = 200, description = "User profile", body = UserInfoResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Session user no longer exists"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_user_info(State(state): State<AppState>, user: CurrentUser) -> Result<Json<UserInfoResponse>, Error> {
    let resolver = PermissionResolver::new(&state);
    let info = resolver.get_user_info(user.id).await?;

    Ok(Json(UserInfoResponse::from(info)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password;
    use crate::cache::keys;
    use crate::db::models::permissions::PermissionKind;
    use crate::test_utils::create_test_state;
    use axum::http::header::{AUTHORIZATION, USER_AGENT};
    use axum_test::TestServer;

    // Requester identity pinned on every captcha/login request so the
    // challenge key is deterministic
    const CLIENT_IP: &str = "203.0.113.7";
    const CLIENT_AGENT: &str = "warden-tests";

    async fn solve_captcha(server: &TestServer, state: &AppState) -> String {
        let response = server
            .get("/authentication/captcha")
            .add_header("x-forwarded-for", CLIENT_IP)
            .add_header(USER_AGENT, CLIENT_AGENT)
            .await;
        response.assert_status_ok();
        let body: CaptchaResponse = response.json();
        assert!(body.captcha.starts_with("data:image/"));

        // The expected text never leaves the server; fish it out of the cache
        state
            .cache
            .get(&keys::captcha_key(CLIENT_IP, CLIENT_AGENT))
            .await
            .unwrap()
            .expect("challenge should be stored")
    }

    async fn post_login(server: &TestServer, user_name: &str, password: &str, captcha: &str) -> axum_test::TestResponse {
        server
            .post("/authentication/login")
            .add_header("x-forwarded-for", CLIENT_IP)
            .add_header(USER_AGENT, CLIENT_AGENT)
            .json(&LoginRequest {
                user_name: user_name.to_string(),
                password: password.to_string(),
                captcha: captcha.to_string(),
            })
            .await
    }

    #[test_log::test(tokio::test)]
    async fn test_captcha_login_user_info_logout_flow() {
        let (state, store) = create_test_state();
        let p = store.add_permission("role:list", PermissionKind::Api);
        let role = store.add_role("ops", false, vec![p]);
        let user_id = store.add_user("alice", &password::hash_string("correct horse").unwrap(), vec![role]);

        let server = TestServer::new(crate::build_router(state.clone())).unwrap();

        // Login with the solved challenge
        let text = solve_captcha(&server, &state).await;
        let response = post_login(&server, "alice", "correct horse", &text).await;
        response.assert_status_ok();
        let LoginResponse { token } = response.json();

        let mirrored = state.cache.get(&keys::sso_key(user_id)).await.unwrap();
        assert_eq!(mirrored.as_deref(), Some(token.as_str()));

        // The token is accepted and resolves the profile
        let response = server
            .get("/authentication/user-info")
            .add_header(AUTHORIZATION, format!("Bearer {token}"))
            .await;
        response.assert_status_ok();
        let info: serde_json::Value = response.json();
        assert_eq!(info["name"], "alice");
        assert_eq!(info["roles"][0], "ops");
        assert_eq!(info["permissions"][0], "role:list");

        // Logout revokes it
        let response = server
            .post("/authentication/logout")
            .add_header(AUTHORIZATION, format!("Bearer {token}"))
            .await;
        response.assert_status_ok();

        let response = server
            .get("/authentication/user-info")
            .add_header(AUTHORIZATION, format!("Bearer {token}"))
            .await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_denials_surface_as_400() {
        let (state, store) = create_test_state();
        store.add_user("alice", &password::hash_string("pw").unwrap(), vec![]);

        let server = TestServer::new(crate::build_router(state.clone())).unwrap();

        // Wrong captcha
        solve_captcha(&server, &state).await;
        let response = post_login(&server, "alice", "pw", "nope").await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Captcha is invalid");

        // Wrong password
        let text = solve_captcha(&server, &state).await;
        let response = post_login(&server, "alice", "wrong", &text).await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Password is invalid");
    }

    #[test_log::test(tokio::test)]
    async fn test_superseded_token_is_rejected() {
        let (state, store) = create_test_state();
        store.add_user("alice", &password::hash_string("pw").unwrap(), vec![]);

        let server = TestServer::new(crate::build_router(state.clone())).unwrap();

        let text = solve_captcha(&server, &state).await;
        let response = post_login(&server, "alice", "pw", &text).await;
        let LoginResponse { token: first } = response.json();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let text = solve_captcha(&server, &state).await;
        let response = post_login(&server, "alice", "pw", &text).await;
        let LoginResponse { token: second } = response.json();

        // Only the latest session holds authority
        let response = server
            .get("/authentication/user-info")
            .add_header(AUTHORIZATION, format!("Bearer {first}"))
            .await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);

        let response = server
            .get("/authentication/user-info")
            .add_header(AUTHORIZATION, format!("Bearer {second}"))
            .await;
        response.assert_status_ok();
    }
}
