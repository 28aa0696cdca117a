//! Challenge-response captcha issuance and verification.
//!
//! A challenge is bound to the requester identity `(ip, user agent)` used at
//! issuance; verification derives the same key, so there is no mismatch
//! tolerance. A challenge is single-use: the first successful verification
//! deletes it, while a failed attempt leaves it in place for a retry.

use std::time::Duration;

use captcha_rs::CaptchaBuilder;
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    cache::{keys, Cache},
    errors::Result,
};

/// Number of characters in a challenge.
const CAPTCHA_LENGTH: usize = 4;

/// Rendered challenge handed back to the caller. The expected text is only
/// ever stored server-side.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CaptchaImage {
    /// Inline-encodable data URI (base64 PNG)
    pub image: String,
}

/// Generate a challenge, store its text under the requester's key, and
/// return the rendered image.
#[instrument(skip(cache, ttl))]
pub async fn issue(cache: &Cache, ttl: Duration, ip: &str, user_agent: &str) -> Result<CaptchaImage> {
    let captcha = CaptchaBuilder::new()
        .length(CAPTCHA_LENGTH)
        .width(130)
        .height(40)
        .dark_mode(false)
        .complexity(4)
        .compression(40)
        .build();

    cache.set(&keys::captcha_key(ip, user_agent), &captcha.text, ttl).await?;

    Ok(CaptchaImage {
        image: captcha.to_base64(),
    })
}

/// Check a submitted answer, case-insensitively, against the stored text.
///
/// Returns false on mismatch or when no challenge is stored; only a
/// successful match consumes the challenge.
#[instrument(skip(cache, submitted))]
pub async fn verify(cache: &Cache, ip: &str, user_agent: &str, submitted: &str) -> Result<bool> {
    let key = keys::captcha_key(ip, user_agent);

    match cache.get(&key).await? {
        Some(stored) if stored.eq_ignore_ascii_case(submitted) => {
            cache.delete(&key).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache;

    const TTL: Duration = Duration::from_secs(120);

    #[tokio::test]
    async fn test_issue_returns_image_not_text() {
        let cache = cache::connect();

        let challenge = issue(&cache, TTL, "10.0.0.1", "agent").await.unwrap();
        assert!(challenge.image.starts_with("data:image/"));

        let stored = cache.get(&keys::captcha_key("10.0.0.1", "agent")).await.unwrap().unwrap();
        assert_eq!(stored.len(), CAPTCHA_LENGTH);
    }

    #[tokio::test]
    async fn test_verify_succeeds_exactly_once() {
        let cache = cache::connect();

        issue(&cache, TTL, "10.0.0.1", "agent").await.unwrap();
        let stored = cache.get(&keys::captcha_key("10.0.0.1", "agent")).await.unwrap().unwrap();

        // Case-insensitive match consumes the challenge
        assert!(verify(&cache, "10.0.0.1", "agent", &stored.to_uppercase()).await.unwrap());
        assert!(!verify(&cache, "10.0.0.1", "agent", &stored).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_verify_does_not_consume() {
        let cache = cache::connect();

        issue(&cache, TTL, "10.0.0.1", "agent").await.unwrap();
        let stored = cache.get(&keys::captcha_key("10.0.0.1", "agent")).await.unwrap().unwrap();

        assert!(!verify(&cache, "10.0.0.1", "agent", "????").await.unwrap());
        assert!(verify(&cache, "10.0.0.1", "agent", &stored).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_binds_requester_identity() {
        let cache = cache::connect();

        issue(&cache, TTL, "10.0.0.1", "agent").await.unwrap();
        let stored = cache.get(&keys::captcha_key("10.0.0.1", "agent")).await.unwrap().unwrap();

        assert!(!verify(&cache, "10.0.0.2", "agent", &stored).await.unwrap());
        assert!(!verify(&cache, "10.0.0.1", "other-agent", &stored).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_challenge_fails() {
        let cache = cache::connect();

        issue(&cache, Duration::from_millis(10), "10.0.0.1", "agent").await.unwrap();
        let stored = cache.get(&keys::captcha_key("10.0.0.1", "agent")).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!verify(&cache, "10.0.0.1", "agent", &stored).await.unwrap());
    }
}
