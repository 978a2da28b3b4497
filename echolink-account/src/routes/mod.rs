use diesel::pg::PgConnection;
use uuid::Uuid;

use echolink_shared::errors::{AppError, AppResult, ErrorCode};
use echolink_shared::types::auth::AuthUser;

use crate::models::{IdentityKind, UploadIdentity};
use crate::services::identity_service;

pub mod health;
pub mod identities;
pub mod internal;
pub mod link;
pub mod stats;

/// Resolve the session user to their upload identity and owning account,
/// provisioning both on first contact. Every authenticated route goes
/// through here, mirroring how a login email converges on one account.
pub(crate) fn resolve_web_identity(
    conn: &mut PgConnection,
    user: &AuthUser,
) -> AppResult<(UploadIdentity, Uuid)> {
    let identity = identity_service::get_or_create_upload_identity(
        conn,
        IdentityKind::WebUser,
        &user.id.to_string(),
        user.email.as_deref(),
        None,
    )?;

    let account_id = identity.account_id.ok_or_else(|| {
        AppError::new(ErrorCode::NoAccount, "No account found for this user.")
    })?;

    Ok((identity, account_id))
}
