use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use echolink_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{IdentityKind, IdentityMetadata, IdentityStats, NewUploadIdentity, UploadIdentity};
use crate::schema::upload_identities;
use crate::services::account_service;

/// Resolve an authentication surface to its upload identity, provisioning
/// the identity (and an owning account) on first contact.
///
/// Repeat calls with the same `(kind, external_id)` return the same row;
/// a supplied display name or metadata refreshes the stored values
/// (last-write-wins, no key merge) without touching the account link.
pub fn get_or_create_upload_identity(
    conn: &mut PgConnection,
    kind: IdentityKind,
    external_id: &str,
    display_name: Option<&str>,
    metadata: Option<&IdentityMetadata>,
) -> AppResult<UploadIdentity> {
    if let Some(existing) = get_upload_identity_by_kind_and_external_id(conn, kind, external_id)? {
        if display_name.is_some() || metadata.is_some() {
            return update_upload_identity(conn, existing.id, display_name, metadata);
        }
        return Ok(existing);
    }

    // First contact: pick the owning account. A web login whose display
    // name is an email address joins (or creates) the account keyed by
    // that address; everything else gets a fresh email-less account.
    let account = match display_name {
        Some(name) if kind == IdentityKind::WebUser && looks_like_email(name) => {
            account_service::get_or_create_account_for_email(conn, name)?
        }
        _ => account_service::create_account(conn, None)?,
    };

    match create_upload_identity(conn, Some(account.id), kind, external_id, display_name, metadata) {
        Ok(identity) => Ok(identity),
        Err(AppError::Database(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))) => {
            // Lost a first-login race; the winner's row is the identity.
            tracing::debug!(kind = %kind, external_id = %external_id, "identity insert raced, retrying as lookup");
            get_upload_identity_by_kind_and_external_id(conn, kind, external_id)?.ok_or_else(|| {
                AppError::new(
                    ErrorCode::IdentityNotFound,
                    format!("identity vanished after insert conflict: {kind}/{external_id}"),
                )
            })
        }
        Err(e) => Err(e),
    }
}

pub fn create_upload_identity(
    conn: &mut PgConnection,
    account_id: Option<Uuid>,
    kind: IdentityKind,
    external_id: &str,
    display_name: Option<&str>,
    metadata: Option<&IdentityMetadata>,
) -> AppResult<UploadIdentity> {
    let new_identity = NewUploadIdentity {
        account_id,
        kind: kind.as_str().to_string(),
        external_id: external_id.to_string(),
        display_name: display_name.map(str::to_string),
        extra_metadata: metadata.and_then(IdentityMetadata::to_value),
    };

    let identity: UploadIdentity = diesel::insert_into(upload_identities::table)
        .values(&new_identity)
        .get_result(conn)?;

    tracing::info!(
        identity_id = %identity.id,
        kind = %kind,
        external_id = %external_id,
        "upload identity created"
    );

    Ok(identity)
}

pub fn get_upload_identity_by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<UploadIdentity>> {
    let identity = upload_identities::table
        .filter(upload_identities::id.eq(id))
        .first::<UploadIdentity>(conn)
        .optional()?;
    Ok(identity)
}

pub fn get_upload_identity_by_kind_and_external_id(
    conn: &mut PgConnection,
    kind: IdentityKind,
    external_id: &str,
) -> AppResult<Option<UploadIdentity>> {
    let identity = upload_identities::table
        .filter(upload_identities::kind.eq(kind.as_str()))
        .filter(upload_identities::external_id.eq(external_id))
        .first::<UploadIdentity>(conn)
        .optional()?;
    Ok(identity)
}

#[derive(AsChangeset)]
#[diesel(table_name = upload_identities)]
struct IdentityChangeset {
    display_name: Option<String>,
    extra_metadata: Option<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

pub fn update_upload_identity(
    conn: &mut PgConnection,
    id: Uuid,
    display_name: Option<&str>,
    metadata: Option<&IdentityMetadata>,
) -> AppResult<UploadIdentity> {
    let changes = IdentityChangeset {
        display_name: display_name.map(str::to_string),
        extra_metadata: metadata.and_then(IdentityMetadata::to_value),
        updated_at: Utc::now(),
    };

    let identity = diesel::update(upload_identities::table.filter(upload_identities::id.eq(id)))
        .set(&changes)
        .get_result::<UploadIdentity>(conn)?;

    Ok(identity)
}

/// Unlink: removes the authentication surface. Files uploaded through it
/// keep their `account_id` and stay attributed to the account.
pub fn delete_upload_identity(conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
    diesel::delete(upload_identities::table.filter(upload_identities::id.eq(id))).execute(conn)?;
    tracing::info!(identity_id = %id, "upload identity deleted");
    Ok(())
}

pub fn get_upload_identity_stats(conn: &mut PgConnection, identity_id: Uuid) -> AppResult<IdentityStats> {
    let stats = diesel::sql_query(
        "SELECT \
           COALESCE(COUNT(f.id), 0)::bigint AS total_files, \
           COALESCE(SUM(f.size_bytes), 0)::bigint AS total_bytes, \
           COALESCE(COUNT(f.id) FILTER (WHERE f.created_at >= NOW() - INTERVAL '24 hours'), 0)::bigint AS files_last_24h, \
           COALESCE(SUM(f.size_bytes) FILTER (WHERE f.created_at >= NOW() - INTERVAL '24 hours'), 0)::bigint AS bytes_last_24h \
         FROM files f \
         WHERE f.upload_identity_id = $1",
    )
    .bind::<diesel::sql_types::Uuid, _>(identity_id)
    .get_result::<IdentityStats>(conn)?;

    Ok(stats)
}

fn looks_like_email(value: &str) -> bool {
    validator::validate_email(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_like_display_names() {
        assert!(looks_like_email("a@x.com"));
        assert!(looks_like_email("user.name+tag@sub.example.org"));
    }

    #[test]
    fn non_email_display_names() {
        assert!(!looks_like_email("GrosChat#1234"));
        assert!(!looks_like_email("not an email"));
        assert!(!looks_like_email(""));
        assert!(!looks_like_email("@no-local-part.com"));
    }
}
