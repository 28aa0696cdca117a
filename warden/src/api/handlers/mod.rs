//! Axum route handlers.

pub mod auth;
pub mod roles;
