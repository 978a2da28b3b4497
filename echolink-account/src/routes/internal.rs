use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use echolink_shared::errors::{AppError, AppResult, ErrorCode};
use echolink_shared::types::ApiResponse;

use crate::models::{IdentityKind, IdentityMetadata, UploadIdentity};
use crate::services::{identity_service, limits_service, link_service};
use crate::services::limits_service::UploadLimitResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveIdentityRequest {
    pub kind: IdentityKind,
    pub external_id: String,
    pub display_name: Option<String>,
    pub metadata: Option<IdentityMetadata>,
}

/// POST /internal/resolve-identity — Resolve or provision the identity for
/// an authentication surface (service-to-service, no auth)
pub async fn resolve_identity(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResolveIdentityRequest>,
) -> AppResult<Json<ApiResponse<UploadIdentity>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let identity = identity_service::get_or_create_upload_identity(
        &mut conn,
        req.kind,
        &req.external_id,
        req.display_name.as_deref(),
        req.metadata.as_ref(),
    )?;

    Ok(Json(ApiResponse::ok(identity)))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeUploadRequest {
    pub identity_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub size_bytes: i64,
}

/// POST /internal/authorize-upload — Quota check before the upload service
/// persists a file (service-to-service, no auth). Read-only: passing the
/// check reserves nothing.
pub async fn authorize_upload(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthorizeUploadRequest>,
) -> AppResult<Json<ApiResponse<UploadLimitResult>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let limits = state.config.limits;

    let result = match (req.identity_id, req.account_id) {
        (Some(identity_id), _) => {
            let identity = identity_service::get_upload_identity_by_id(&mut conn, identity_id)?
                .ok_or_else(|| AppError::new(ErrorCode::IdentityNotFound, "Identity not found."))?;
            limits_service::assert_upload_allowed(&mut conn, &limits, &identity, req.size_bytes)?
        }
        (None, Some(account_id)) => {
            limits_service::assert_upload_allowed_for_account(&mut conn, &limits, account_id, req.size_bytes)?
        }
        (None, None) => {
            return Err(AppError::bad_request("identity_id or account_id required"));
        }
    };

    Ok(Json(ApiResponse::ok(result)))
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}

/// POST /internal/cleanup-link-requests — Drop long-expired link codes
/// (service-to-service, no auth). Invoked by the periodic cleanup job.
pub async fn cleanup_link_requests(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<CleanupResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let removed = link_service::cleanup_expired_link_requests(&mut conn)?;

    Ok(Json(ApiResponse::ok(CleanupResponse { removed })))
}
