//! JWT session tokens and the single-active-session lifecycle.
//!
//! Login issues a signed token and mirrors it under the per-user SSO key,
//! overwriting whatever was there: the previous token stays cryptographically
//! valid until it expires, but any guard that confirms against the mirror
//! rejects it from that point on. Logout writes the presented token into the
//! blacklist. Mirror writes are last-write-wins; a login racing a logout for
//! the same user has no defined winner beyond whichever write lands last.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    auth::{captcha, current_user::RequestContext, password},
    cache::{keys, Cache},
    config::Config,
    db::CredentialStore,
    errors::{Denial, Error, Outcome, Result},
    types::UserId,
    AppState,
};

/// JWT session claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

impl SessionClaims {
    /// Create new session claims for a user
    pub fn new(user_id: UserId, user_name: &str, config: &Config) -> Self {
        let now = Utc::now();
        let exp = now + config.auth.jwt_expires_in;

        Self {
            user_id,
            user_name: user_name.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

/// Resolve the signing key from configuration: an RSA PEM pair means RS256,
/// otherwise HS256 over the shared secret. Neither configured is a hard
/// misconfiguration error.
fn encoding_key(config: &Config) -> Result<(EncodingKey, Algorithm)> {
    if let Some(pem) = &config.jwt_private_key {
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| Error::Internal {
            operation: format!("parse jwt_private_key: {e}"),
        })?;
        return Ok((key, Algorithm::RS256));
    }

    let secret = config.secret_key.as_ref().ok_or_else(|| Error::Internal {
        operation: "JWT sessions: no signing key configured".to_string(),
    })?;
    Ok((EncodingKey::from_secret(secret.as_bytes()), Algorithm::HS256))
}

fn decoding_key(config: &Config) -> Result<(DecodingKey, Algorithm)> {
    if let Some(pem) = &config.jwt_public_key {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| Error::Internal {
            operation: format!("parse jwt_public_key: {e}"),
        })?;
        return Ok((key, Algorithm::RS256));
    }

    let secret = config.secret_key.as_ref().ok_or_else(|| Error::Internal {
        operation: "JWT sessions: no verification key configured".to_string(),
    })?;
    Ok((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256))
}

/// Create a signed session token for a user
pub fn create_session_token(user_id: UserId, user_name: &str, config: &Config) -> Result<String> {
    let claims = SessionClaims::new(user_id, user_name, config);
    let (key, algorithm) = encoding_key(config)?;

    encode(&Header::new(algorithm), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Verify and decode a session token
pub fn verify_session_token(token: &str, config: &Config) -> Result<SessionClaims> {
    let (key, algorithm) = decoding_key(config)?;
    let validation = Validation::new(algorithm);

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

        // Server errors (500) - key issues, internal failures
        _ => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },
    })?;

    Ok(token_data.claims)
}

/// Whether a token has been revoked via logout.
///
/// Any guard must treat a blacklisted token as invalid regardless of
/// signature validity.
pub async fn is_revoked(cache: &Cache, token: &str) -> Result<bool> {
    Ok(cache.get(&keys::blacklist_key(token)).await?.is_some())
}

/// Whether a token is the user's current session, i.e. matches the SSO
/// mirror. A missing mirror means the session is no longer live.
pub async fn is_current(cache: &Cache, user_id: UserId, token: &str) -> Result<bool> {
    Ok(cache.get(&keys::sso_key(user_id)).await?.as_deref() == Some(token))
}

/// Credential authentication and session issuance/revocation.
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    cache: Cache,
    config: Config,
}

impl SessionManager {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            cache: state.cache.clone(),
            config: state.config.clone(),
        }
    }

    /// Authenticate and issue a session token.
    ///
    /// Captcha, user-name and password failures are routine outcomes and come
    /// back as [`Denial`] values. The captcha is checked before the user
    /// lookup, so a failed challenge reveals nothing about account existence.
    #[instrument(skip(self, password, captcha_text), fields(user_name = %user_name))]
    pub async fn login(&self, user_name: &str, password: &str, captcha_text: &str, ctx: &RequestContext) -> Result<Outcome<String>> {
        if !captcha::verify(&self.cache, &ctx.ip, &ctx.user_agent, captcha_text).await? {
            return Ok(Err(Denial::captcha_invalid()));
        }

        let Some(user) = self.store.find_user_by_name(user_name).await? else {
            return Ok(Err(Denial::user_name_invalid()));
        };

        // Verify password on a blocking thread to avoid stalling the runtime
        let submitted = password.to_string();
        let hash = user.password_hash.clone();
        let is_valid = tokio::task::spawn_blocking(move || password::verify_string(&submitted, &hash))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password verification task: {e}"),
            })??;

        if !is_valid {
            return Ok(Err(Denial::password_invalid()));
        }

        let token = create_session_token(user.id, &user.user_name, &self.config)?;

        // SSO enforcement point: the mirror holds at most one token per user
        // and a new login overwrites it
        self.cache
            .set(&keys::sso_key(user.id), &token, self.config.auth.jwt_expires_in)
            .await?;

        Ok(Ok(token))
    }

    /// Revoke the presented token. Idempotent; repeating a logout only
    /// refreshes the blacklist TTL.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.cache
            .set(&keys::blacklist_key(token), "", self.config.auth.jwt_expires_in)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_config, create_test_state, seed_captcha};
    use uuid::Uuid;

    #[test]
    fn test_create_and_verify_session_token() {
        let config = create_test_config();
        let user_id = Uuid::new_v4();

        let token = create_session_token(user_id, "alice", &config).unwrap();
        assert!(!token.is_empty());

        let claims = verify_session_token(&token, &config).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.user_name, "alice");
    }

    #[test]
    fn test_verify_invalid_token() {
        let config = create_test_config();

        let result = verify_session_token("invalid.token.here", &config);
        assert!(matches!(result.unwrap_err(), Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_verify_token_wrong_secret() {
        let mut config = create_test_config();
        let token = create_session_token(Uuid::new_v4(), "alice", &config).unwrap();

        config.secret_key = Some("different-secret".to_string());
        let result = verify_session_token(&token, &config);
        // Should be Unauthenticated (InvalidSignature), not Internal error
        assert!(matches!(result.unwrap_err(), Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_verify_expired_token() {
        let config = create_test_config();
        let now = Utc::now();
        let claims = SessionClaims {
            user_id: Uuid::new_v4(),
            user_name: "alice".to_string(),
            exp: (now - chrono::Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
        };

        let key = EncodingKey::from_secret(config.secret_key.as_ref().unwrap().as_bytes());
        let token = encode(&Header::default(), &claims, &key).unwrap();

        let result = verify_session_token(&token, &config);
        assert!(matches!(result.unwrap_err(), Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_missing_key_material_is_hard_error() {
        let mut config = create_test_config();
        config.secret_key = None;

        let result = create_session_token(Uuid::new_v4(), "alice", &config);
        assert!(matches!(result.unwrap_err(), Error::Internal { .. }));
    }

    #[tokio::test]
    async fn test_login_success_writes_mirror() {
        let (state, store) = create_test_state();
        let user_id = store.add_user("alice", &password::hash_string("correct horse").unwrap(), vec![]);

        let ctx = RequestContext::new("10.0.0.1", "test-agent");
        seed_captcha(&state.cache, &ctx, "abcd").await;

        let sessions = SessionManager::new(&state);
        let token = sessions.login("alice", "correct horse", "abcd", &ctx).await.unwrap().unwrap();

        let mirrored = state.cache.get(&keys::sso_key(user_id)).await.unwrap();
        assert_eq!(mirrored.as_deref(), Some(token.as_str()));
        assert!(is_current(&state.cache, user_id, &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_login_invalid_captcha() {
        let (state, store) = create_test_state();
        store.add_user("alice", &password::hash_string("pw").unwrap(), vec![]);

        let ctx = RequestContext::new("10.0.0.1", "test-agent");
        seed_captcha(&state.cache, &ctx, "abcd").await;

        let sessions = SessionManager::new(&state);
        let denial = sessions.login("alice", "pw", "wxyz", &ctx).await.unwrap().unwrap_err();
        assert_eq!(denial, Denial::captcha_invalid());

        // A failed attempt must not consume the challenge
        let retry = sessions.login("alice", "pw", "abcd", &ctx).await.unwrap();
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let (state, _store) = create_test_state();

        let ctx = RequestContext::new("10.0.0.1", "test-agent");
        seed_captcha(&state.cache, &ctx, "abcd").await;

        let sessions = SessionManager::new(&state);
        let denial = sessions.login("nobody", "pw", "abcd", &ctx).await.unwrap().unwrap_err();
        assert_eq!(denial, Denial::user_name_invalid());
    }

    #[tokio::test]
    async fn test_login_wrong_password_writes_no_mirror() {
        let (state, store) = create_test_state();
        let user_id = store.add_user("alice", &password::hash_string("correct horse").unwrap(), vec![]);

        let ctx = RequestContext::new("10.0.0.1", "test-agent");
        seed_captcha(&state.cache, &ctx, "abcd").await;

        let sessions = SessionManager::new(&state);
        let denial = sessions.login("alice", "battery staple", "abcd", &ctx).await.unwrap().unwrap_err();
        assert_eq!(denial, Denial::password_invalid());

        assert_eq!(state.cache.get(&keys::sso_key(user_id)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_login_overwrites_mirror() {
        let (state, store) = create_test_state();
        let user_id = store.add_user("alice", &password::hash_string("pw").unwrap(), vec![]);

        let ctx = RequestContext::new("10.0.0.1", "test-agent");
        let sessions = SessionManager::new(&state);

        seed_captcha(&state.cache, &ctx, "aaaa").await;
        let first = sessions.login("alice", "pw", "aaaa", &ctx).await.unwrap().unwrap();

        // A later login gets a distinct iat-second to guarantee distinct tokens
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        seed_captcha(&state.cache, &ctx, "bbbb").await;
        let second = sessions.login("alice", "pw", "bbbb", &ctx).await.unwrap().unwrap();

        assert_ne!(first, second);
        let mirrored = state.cache.get(&keys::sso_key(user_id)).await.unwrap();
        assert_eq!(mirrored.as_deref(), Some(second.as_str()));

        // The first token remains signature-valid but is no longer current
        assert!(verify_session_token(&first, &state.config).is_ok());
        assert!(!is_current(&state.cache, user_id, &first).await.unwrap());
        assert!(is_current(&state.cache, user_id, &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_blacklists_token() {
        let (state, _store) = create_test_state();
        let sessions = SessionManager::new(&state);

        let token = create_session_token(Uuid::new_v4(), "alice", &state.config).unwrap();
        assert!(!is_revoked(&state.cache, &token).await.unwrap());

        sessions.logout(&token).await.unwrap();
        assert!(is_revoked(&state.cache, &token).await.unwrap());

        // Idempotent
        sessions.logout(&token).await.unwrap();
        assert!(is_revoked(&state.cache, &token).await.unwrap());
    }
}
