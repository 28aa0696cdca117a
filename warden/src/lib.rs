//! # warden: authentication and RBAC for admin applications
//!
//! `warden` is the authentication and role-based-access-control subsystem of
//! a multi-user administrative application. It issues and revokes
//! single-sign-on session tokens, gates login behind a challenge-response
//! captcha, and resolves a user's effective permission set (and derived
//! navigation menu) from role assignments, with a per-user read-through
//! cache to avoid repeated aggregation.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); PostgreSQL
//! holds users, roles, permissions and their associations behind the
//! [`db::CredentialStore`] seam, and a key-value [`cache::CacheStore`] with
//! per-entry TTLs holds the ephemeral state: captcha challenges, the
//! per-user SSO token mirror, the logout blacklist and cached permission
//! sets.
//!
//! ### Request flow
//!
//! A client fetches a captcha (`GET /authentication/captcha`), then logs in
//! (`POST /authentication/login`) with user name, password and the captcha
//! answer. Login failures are routine outcomes and come back as structured
//! denial bodies, never as unwound errors. A successful login returns a JWT
//! and records it under the user's SSO mirror key, displacing any earlier
//! session. Subsequent requests present the token as a bearer credential;
//! the [`auth::current_user::CurrentUser`] extractor accepts it only if the
//! signature verifies, the token is not blacklisted, and it still matches
//! the mirror. Role administration routes additionally require `role:*`
//! permission codes, resolved through the per-user permission cache.
//!
//! Role mutations that change what a role grants (its disabled flag or its
//! permission set) delete the cached permission sets of every assigned user,
//! so authorization never trusts a stale aggregate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use warden::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = warden::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     warden::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod roles;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use bon::Builder;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, instrument, Level};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    cache::Cache,
    db::{models::users::UserCreateDBRequest, CredentialStore, PgCredentialStore},
    errors::Error,
    openapi::ApiDoc,
    types::{UserId, DEFAULT_ADMIN_ROLE_ID},
};

pub use config::Config;

/// Application state shared across all request handlers: the credential
/// store, the cache handle and the configuration, injected rather than
/// reached for as globals.
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub cache: Cache,
    pub config: Config,
}

/// Get the warden database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial administrator account if it doesn't exist.
///
/// Idempotent: an existing account keeps its identity and only has its
/// password refreshed when one is configured. A missing account is created
/// with the default administrator role assigned. Without a configured
/// password no account is created, since it could never log in.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(user_name: &str, password: Option<&str>, db: &PgPool) -> Result<Option<UserId>, Error> {
    let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = db::handlers::Users::new(&mut conn);

    if let Some(existing) = users.get_by_user_name(user_name).await? {
        if let Some(password) = password {
            let password_hash = auth::password::hash_string(password)?;
            users.update_password(existing.id, &password_hash).await?;
        }
        return Ok(Some(existing.id));
    }

    let Some(password) = password else {
        tracing::warn!("admin_password is not configured; skipping initial administrator creation");
        return Ok(None);
    };

    let password_hash = auth::password::hash_string(password)?;
    let created = users
        .create(&UserCreateDBRequest {
            user_name: user_name.to_string(),
            password_hash,
            nick_name: None,
            avatar: None,
            role_ids: vec![DEFAULT_ADMIN_ROLE_ID],
        })
        .await?;

    info!("Created initial administrator account '{user_name}'");
    Ok(Some(created.id))
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/authentication/captcha", get(api::handlers::auth::get_captcha))
        .route("/authentication/login", post(api::handlers::auth::login))
        .route("/authentication/logout", post(api::handlers::auth::logout))
        .route("/authentication/user-info", get(api::handlers::auth::get_user_info))
        .with_state(state.clone());

    let role_routes = Router::new()
        .route(
            "/roles",
            get(api::handlers::roles::list_roles).post(api::handlers::roles::create_role),
        )
        .route("/roles/batch-remove", post(api::handlers::roles::batch_remove_roles))
        .route(
            "/roles/{id}",
            get(api::handlers::roles::get_role)
                .patch(api::handlers::roles::update_role)
                .delete(api::handlers::roles::remove_role),
        )
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .nest("/admin/api/v1", role_routes)
        .merge(Scalar::with_url("/admin/docs", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Main application struct owning all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects the stores, runs migrations
///    and seeds the initial administrator
/// 2. **Serve**: [`Application::serve`] binds and handles requests until the
///    shutdown future resolves
/// 3. **Shutdown**: connections are drained and the stores closed
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    cache: Cache,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting warden with configuration: {:#?}", config);

        let database_url = config
            .database_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("database_url is required (set DATABASE_URL or database_url in the config file)"))?;

        let pool = PgPool::connect(&database_url).await?;
        migrator().run(&pool).await?;

        create_initial_admin_user(&config.admin_user_name, config.admin_password.as_deref(), &pool).await?;

        let cache = cache::connect();
        let store: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool.clone()));

        let state = AppState::builder().store(store).cache(cache.clone()).config(config.clone()).build();
        let router = build_router(state);

        Ok(Self {
            router,
            config,
            pool,
            cache,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("warden listening on http://{bind_addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;
        self.cache.close().await;

        Ok(())
    }
}
