use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use echolink_shared::errors::{AppError, AppResult, ErrorCode};
use echolink_shared::types::auth::AuthUser;
use echolink_shared::types::ApiResponse;

use crate::routes::resolve_web_identity;
use crate::services::{account_service, identity_service};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: Uuid,
    pub primary_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IdentityView {
    pub id: Uuid,
    pub kind: String,
    pub display_name: Option<String>,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IdentitiesResponse {
    pub account: Option<AccountView>,
    pub identities: Vec<IdentityView>,
}

/// GET /me/identities — the caller's account and every surface linked to it.
pub async fn list_identities(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<IdentitiesResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (_, account_id) = resolve_web_identity(&mut conn, &user)?;

    let account = account_service::get_account_by_id(&mut conn, account_id)?.map(|a| AccountView {
        id: a.id,
        primary_email: a.primary_email,
        created_at: a.created_at,
    });

    let identities = account_service::get_account_identities(&mut conn, account_id)?
        .into_iter()
        .map(|i| IdentityView {
            id: i.id,
            kind: i.kind,
            display_name: i.display_name,
            external_id: i.external_id,
            created_at: i.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::ok(IdentitiesResponse { account, identities })))
}

/// DELETE /me/discord/unlink/:identity_id — detach a Discord surface from
/// the caller's account. Files it uploaded stay with the account.
pub async fn unlink_discord(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(identity_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (_, account_id) = resolve_web_identity(&mut conn, &user)?;

    let identity = identity_service::get_upload_identity_by_id(&mut conn, identity_id)?
        .ok_or_else(|| AppError::new(ErrorCode::IdentityNotFound, "Identity not found."))?;

    if identity.account_id != Some(account_id) {
        return Err(AppError::new(
            ErrorCode::NotIdentityOwner,
            "This identity does not belong to your account.",
        ));
    }

    if !identity.is_discord() {
        return Err(AppError::new(
            ErrorCode::CannotUnlinkKind,
            "Only Discord identities can be unlinked.",
        ));
    }

    identity_service::delete_upload_identity(&mut conn, identity.id)?;

    tracing::info!(
        identity_id = %identity.id,
        account_id = %account_id,
        "discord identity unlinked"
    );

    Ok(Json(ApiResponse::ok_with_message(
        "unlinked",
        "Compte Discord délié avec succès.",
    )))
}
