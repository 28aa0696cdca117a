//! API layer for HTTP request handling and data models.
//!
//! This module contains the REST surface, organized into:
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): captcha, login, logout,
//!   user info
//! - **Roles** (`/admin/api/v1/roles/*`): role administration, gated by
//!   `role:*` permission codes
//!
//! All endpoints are documented with OpenAPI annotations via `utoipa`;
//! interactive documentation is served at `/admin/docs`.

pub mod handlers;
pub mod models;
