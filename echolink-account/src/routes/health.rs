use axum::Json;
use echolink_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("echolink-account", env!("CARGO_PKG_VERSION")))
}
