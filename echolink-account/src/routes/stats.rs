use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use echolink_shared::errors::{AppError, AppResult};
use echolink_shared::types::auth::AuthUser;
use echolink_shared::types::ApiResponse;

use crate::routes::resolve_web_identity;
use crate::services::account_service;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct QuotaGauge {
    pub used: i64,
    pub max: i64,
    pub percentage: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub account_id: Uuid,
    pub total_files: i64,
    pub total_bytes: i64,
    pub files_last_24h: i64,
    pub bytes_last_24h: i64,
    pub files: QuotaGauge,
    pub storage: QuotaGauge,
}

fn gauge(used: i64, max: i64) -> QuotaGauge {
    let percentage = if max > 0 { used * 100 / max } else { 0 };
    QuotaGauge { used, max, percentage }
}

/// GET /stats/me — usage aggregates for the caller's account, with quota
/// gauges against the configured limits.
pub async fn my_stats(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<StatsResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (_, account_id) = resolve_web_identity(&mut conn, &user)?;
    let stats = account_service::get_account_stats(&mut conn, account_id)?;
    let limits = state.config.limits;

    Ok(Json(ApiResponse::ok(StatsResponse {
        account_id,
        total_files: stats.total_files,
        total_bytes: stats.total_bytes,
        files_last_24h: stats.files_last_24h,
        bytes_last_24h: stats.bytes_last_24h,
        files: gauge(stats.total_files, limits.max_total_files),
        storage: gauge(stats.total_bytes, limits.max_total_bytes),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_percentage() {
        let g = gauge(250, 500);
        assert_eq!(g.percentage, 50);
        assert_eq!(gauge(0, 500).percentage, 0);
        assert_eq!(gauge(500, 500).percentage, 100);
        assert_eq!(gauge(1, 0).percentage, 0);
    }
}
