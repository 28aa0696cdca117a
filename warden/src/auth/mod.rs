//! Authentication and authorization.
//!
//! This module owns the session lifecycle and permission resolution:
//!
//! - [`captcha`]: challenge issuance and single-use verification, bound to
//!   the requester identity
//! - [`password`]: Argon2id hashing and verification
//! - [`session`]: JWT claims, token issuance, the single-active-session
//!   mirror and the logout blacklist
//! - [`current_user`]: extractors establishing the authenticated user
//!   (signature + blacklist + mirror) and the requester identity
//! - [`permissions`]: effective-permission resolution with the per-user
//!   read-through cache, and the authorization check used by guarded routes
//! - [`menu`]: navigation tree built from non-button permission records
//!
//! # Session authority
//!
//! A session token carries `{userId, userName}` and is only authoritative
//! while it matches the per-user SSO mirror and is not blacklisted. A new
//! login overwrites the mirror, which invalidates every earlier token for
//! that user without touching them individually.

pub mod captcha;
pub mod current_user;
pub mod menu;
pub mod password;
pub mod permissions;
pub mod session;
