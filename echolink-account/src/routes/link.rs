use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use echolink_shared::errors::{AppError, AppResult, ErrorCode};
use echolink_shared::types::auth::AuthUser;
use echolink_shared::types::ApiResponse;

use crate::routes::resolve_web_identity;
use crate::services::{account_service, link_service};
use crate::services::link_service::LinkResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StartLinkResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub instructions: String,
}

/// POST /me/discord/link/start — issue a fresh link code for the caller's
/// account, superseding any outstanding one.
pub async fn start_link(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<StartLinkResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (_, account_id) = resolve_web_identity(&mut conn, &user)?;
    let result = link_service::create_link_request(&mut conn, account_id)?;

    let instructions = format!("Sur Discord, exécute la commande: /link code:{}", result.code);

    Ok(Json(ApiResponse::ok(StartLinkResponse {
        code: result.code,
        expires_at: result.expires_at,
        instructions,
    })))
}

#[derive(Debug, Serialize)]
pub struct DiscordIdentityView {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PendingRequestView {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LinkStatusResponse {
    pub has_discord_linked: bool,
    pub discord_identities: Vec<DiscordIdentityView>,
    pub pending_requests: Vec<PendingRequestView>,
}

/// GET /me/discord/link/status — linked Discord identities and any code
/// still waiting to be redeemed.
pub async fn link_status(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<LinkStatusResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (_, account_id) = resolve_web_identity(&mut conn, &user)?;

    let identities = account_service::get_account_identities(&mut conn, account_id)?;
    let discord_identities: Vec<DiscordIdentityView> = identities
        .into_iter()
        .filter(|i| i.is_discord())
        .map(|i| DiscordIdentityView {
            id: i.id,
            display_name: i.display_name,
            external_id: i.external_id,
            created_at: i.created_at,
        })
        .collect();

    let pending_requests = link_service::get_pending_link_requests_for_account(&mut conn, account_id)?
        .into_iter()
        .map(|r| PendingRequestView {
            code: r.code,
            expires_at: r.expires_at,
        })
        .collect();

    Ok(Json(ApiResponse::ok(LinkStatusResponse {
        has_discord_linked: !discord_identities.is_empty(),
        discord_identities,
        pending_requests,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RedeemLinkRequest {
    pub code: String,
    pub discord_user_id: String,
    pub discord_user_name: Option<String>,
    pub discord_guild_id: Option<String>,
}

/// POST /discord/link — called by the Discord bot when a user runs /link.
/// Authenticated with the bot's service token.
pub async fn redeem_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RedeemLinkRequest>,
) -> AppResult<Json<ApiResponse<LinkResult>>> {
    require_bot_token(&headers, &state.config.bot_token)?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let result = link_service::redeem_link_code(
        &mut conn,
        &req.code,
        &req.discord_user_id,
        req.discord_user_name.as_deref(),
        req.discord_guild_id.as_deref(),
    )?;

    Ok(Json(ApiResponse::ok(result)))
}

fn require_bot_token(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing authorization header"))?;

    if expected.is_empty() || !safe_compare(provided, expected) {
        return Err(AppError::new(ErrorCode::Unauthorized, "invalid bot token"));
    }

    Ok(())
}

// Compare digests rather than the raw strings so the comparison does not
// leak the position of the first mismatch.
fn safe_compare(a: &str, b: &str) -> bool {
    let digest_a = hex::encode(Sha256::digest(a.as_bytes()));
    let digest_b = hex::encode(Sha256::digest(b.as_bytes()));
    digest_a == digest_b
}
