//! Database request/response models shared between the repositories and the
//! [`CredentialStore`](crate::db::CredentialStore) seam.

pub mod permissions;
pub mod roles;
pub mod users;
