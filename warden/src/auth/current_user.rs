//! Request extractors for the authenticated user and the requester identity.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::instrument;

use crate::{
    auth::session,
    errors::{Error, Result},
    types::UserId,
    AppState,
};

/// The authenticated user, established from a bearer session token.
///
/// Signature validity alone is not authority: the token must also be absent
/// from the logout blacklist and must match the user's SSO mirror, so a
/// token superseded by a newer login is rejected here even though it still
/// verifies.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub user_name: String,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    (!token.is_empty()).then(|| token.to_string())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer_token(parts).ok_or(Error::Unauthenticated { message: None })?;

        let claims = session::verify_session_token(&token, &state.config)?;

        if session::is_revoked(&state.cache, &token).await? {
            return Err(Error::Unauthenticated {
                message: Some("Session has been revoked".to_string()),
            });
        }

        if !session::is_current(&state.cache, claims.user_id, &token).await? {
            return Err(Error::Unauthenticated {
                message: Some("Session was superseded by a newer login".to_string()),
            });
        }

        Ok(CurrentUser {
            id: claims.user_id,
            user_name: claims.user_name,
        })
    }
}

/// The raw bearer token, for operations on the token itself (logout).
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl FromRequestParts<AppState> for BearerToken {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self> {
        bearer_token(parts).map(BearerToken).ok_or(Error::Unauthenticated { message: None })
    }
}

/// Requester identity a captcha challenge is bound to.
///
/// The ip is taken from the first `X-Forwarded-For` entry when present,
/// falling back to the peer address; both issuance and verification derive
/// the captcha key from the same pair.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip: String,
    pub user_agent: String,
}

impl RequestContext {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Infallible> {
        let forwarded_for = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|ip| ip.trim().to_string());

        let ip = forwarded_for
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(RequestContext { ip, user_agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn context_for(request: Request<()>) -> RequestContext {
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_request_context_prefers_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .header("user-agent", "test-agent")
            .body(())
            .unwrap();

        let ctx = context_for(request).await;
        assert_eq!(ctx.ip, "203.0.113.9");
        assert_eq!(ctx.user_agent, "test-agent");
    }

    #[tokio::test]
    async fn test_request_context_defaults() {
        let request = Request::builder().body(()).unwrap();

        let ctx = context_for(request).await;
        assert_eq!(ctx.ip, "unknown");
        assert_eq!(ctx.user_agent, "unknown");
    }
}
