//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection (or transaction), provides
//! strongly-typed operations, and returns domain models from
//! [`crate::db::models`]. [`Roles`] implements the full [`Repository`]
//! trait; [`Users`] and [`Permissions`] only expose the lookups (plus the
//! seeding write) this core actually performs.

pub mod permissions;
pub mod repository;
pub mod roles;
pub mod users;

pub use permissions::Permissions;
pub use repository::Repository;
pub use roles::Roles;
pub use users::Users;
