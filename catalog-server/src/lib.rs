//! catalog-server library - AI usage catalog HTTP service
//!
//! Records and aggregates reports of AI usage across an organization:
//! who used what tool for what purpose, and what business impact resulted.

use axum::Router;
use sqlx::SqlitePool;

pub mod aggregate;
pub mod api;
pub mod store;
pub mod transfer;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// When false, the session middleware passes every request through.
    /// Used by integration tests to exercise handlers without cookies.
    pub auth_enabled: bool,
}

impl AppState {
    /// Create new application state with authentication enabled
    pub fn new(db: SqlitePool) -> Self {
        Self { db, auth_enabled: true }
    }

    /// Create application state with the session gate disabled
    pub fn new_unauthenticated(db: SqlitePool) -> Self {
        Self { db, auth_enabled: false }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    // Protected routes (require a valid session)
    let protected = Router::new()
        .merge(api::config::routes())
        .merge(api::entries::routes())
        .merge(api::dashboard::routes())
        .merge(api::transfer::routes())
        .route("/api/auth/logout", post(api::auth::logout))
        .route("/api/auth/me", get(api::auth::me))
        .route("/api/auth/change-password", post(api::auth::change_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::session_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/auth/login", post(api::auth::login))
        .merge(api::health::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
