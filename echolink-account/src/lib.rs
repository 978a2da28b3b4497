use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;

pub use echolink_shared::clients::db::DbPool;

pub struct AppState {
    pub db: DbPool,
    pub config: config::AppConfig,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/me/identities", get(routes::identities::list_identities))
        .route("/me/discord/link/start", post(routes::link::start_link))
        .route("/me/discord/link/status", get(routes::link::link_status))
        .route("/me/discord/unlink/:identity_id", delete(routes::identities::unlink_discord))
        .route("/stats/me", get(routes::stats::my_stats))
        .route("/discord/link", post(routes::link::redeem_link))
        .route("/internal/resolve-identity", post(routes::internal::resolve_identity))
        .route("/internal/authorize-upload", post(routes::internal::authorize_upload))
        .route("/internal/cleanup-link-requests", post(routes::internal::cleanup_link_requests))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
