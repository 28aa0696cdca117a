//! Cache key derivation.
//!
//! The exact formats are a contract shared with any external guard that
//! checks tokens against the blacklist or the SSO mirror; do not change
//! them without migrating consumers.

use crate::types::UserId;

/// Captcha challenge text, bound to the requester identity used at issuance.
pub fn captcha_key(ip: &str, user_agent: &str) -> String {
    format!("captcha:{ip}:{user_agent}")
}

/// The single live session token for a user.
pub fn sso_key(user_id: UserId) -> String {
    format!("sso:{user_id}")
}

/// Revocation marker for a logged-out token.
pub fn blacklist_key(token: &str) -> String {
    format!("blacklist:{token}")
}

/// Cached permission-code set for a user.
pub fn permissions_key(user_id: UserId) -> String {
    format!("permissions:{user_id}")
}
