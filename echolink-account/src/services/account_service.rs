use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::Uuid as SqlUuid;
use uuid::Uuid;

use echolink_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Account, AccountStats, NewAccount, UploadIdentity};
use crate::schema::{accounts, files, upload_identities};

pub fn create_account(conn: &mut PgConnection, primary_email: Option<&str>) -> AppResult<Account> {
    let new_account = NewAccount {
        primary_email: primary_email.map(|e| e.to_lowercase()),
    };

    let account: Account = diesel::insert_into(accounts::table)
        .values(&new_account)
        .get_result(conn)?;

    tracing::info!(
        account_id = %account.id,
        email = account.primary_email.as_deref().unwrap_or("none"),
        "account created"
    );

    Ok(account)
}

pub fn get_account_by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Account>> {
    let account = accounts::table
        .filter(accounts::id.eq(id))
        .first::<Account>(conn)
        .optional()?;
    Ok(account)
}

pub fn get_account_by_email(conn: &mut PgConnection, email: &str) -> AppResult<Option<Account>> {
    let account = accounts::table
        .filter(accounts::primary_email.eq(email.to_lowercase()))
        .first::<Account>(conn)
        .optional()?;
    Ok(account)
}

pub fn update_account_email(conn: &mut PgConnection, account_id: Uuid, email: &str) -> AppResult<Account> {
    let account = diesel::update(accounts::table.filter(accounts::id.eq(account_id)))
        .set((
            accounts::primary_email.eq(email.to_lowercase()),
            accounts::updated_at.eq(Utc::now()),
        ))
        .get_result::<Account>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::new(ErrorCode::AccountNotFound, format!("account not found: {account_id}"))
        })?;

    Ok(account)
}

/// Repeated web logins with the same address always land on the same
/// account, even before any Discord identity exists.
pub fn get_or_create_account_for_email(conn: &mut PgConnection, email: &str) -> AppResult<Account> {
    if let Some(existing) = get_account_by_email(conn, email)? {
        return Ok(existing);
    }

    create_account(conn, Some(email))
}

/// Usage aggregates for one account in a single query. The 24h columns use
/// a rolling window anchored at the query instant, not a calendar day.
pub fn get_account_stats(conn: &mut PgConnection, account_id: Uuid) -> AppResult<AccountStats> {
    let stats = diesel::sql_query(
        "SELECT \
           COALESCE(COUNT(f.id), 0)::bigint AS total_files, \
           COALESCE(SUM(f.size_bytes), 0)::bigint AS total_bytes, \
           COALESCE(COUNT(f.id) FILTER (WHERE f.created_at >= NOW() - INTERVAL '24 hours'), 0)::bigint AS files_last_24h, \
           COALESCE(SUM(f.size_bytes) FILTER (WHERE f.created_at >= NOW() - INTERVAL '24 hours'), 0)::bigint AS bytes_last_24h \
         FROM files f \
         WHERE f.account_id = $1",
    )
    .bind::<SqlUuid, _>(account_id)
    .get_result::<AccountStats>(conn)?;

    Ok(stats)
}

pub fn get_account_identities(conn: &mut PgConnection, account_id: Uuid) -> AppResult<Vec<UploadIdentity>> {
    let identities = upload_identities::table
        .filter(upload_identities::account_id.eq(account_id))
        .order(upload_identities::created_at.asc())
        .load::<UploadIdentity>(conn)?;
    Ok(identities)
}

/// Point an existing identity at `account_id`.
pub fn link_identity_to_account(conn: &mut PgConnection, identity_id: Uuid, account_id: Uuid) -> AppResult<()> {
    diesel::update(upload_identities::table.filter(upload_identities::id.eq(identity_id)))
        .set((
            upload_identities::account_id.eq(account_id),
            upload_identities::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;

    tracing::info!(identity_id = %identity_id, account_id = %account_id, "identity linked to account");
    Ok(())
}

/// Fold `source` into `target`: every file and identity is repointed and
/// the source account row is deleted, all inside one transaction. A failure
/// anywhere rolls the whole merge back, so a half-moved account is never
/// observable.
///
/// No quota re-validation happens here; the merged account may sit above
/// its limits until the next upload is checked.
pub fn merge_accounts(
    conn: &mut PgConnection,
    source_account_id: Uuid,
    target_account_id: Uuid,
) -> AppResult<()> {
    conn.transaction::<_, AppError, _>(|conn| {
        let moved_files = diesel::update(files::table.filter(files::account_id.eq(source_account_id)))
            .set(files::account_id.eq(target_account_id))
            .execute(conn)?;

        let moved_identities =
            diesel::update(upload_identities::table.filter(upload_identities::account_id.eq(source_account_id)))
                .set((
                    upload_identities::account_id.eq(target_account_id),
                    upload_identities::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

        let touched = diesel::update(accounts::table.filter(accounts::id.eq(target_account_id)))
            .set(accounts::updated_at.eq(Utc::now()))
            .execute(conn)?;
        if touched == 0 {
            return Err(AppError::new(
                ErrorCode::AccountNotFound,
                format!("merge target account not found: {target_account_id}"),
            ));
        }

        // Zero files and zero identities reference the source at this point.
        let deleted = diesel::delete(accounts::table.filter(accounts::id.eq(source_account_id)))
            .execute(conn)?;
        if deleted == 0 {
            return Err(AppError::new(
                ErrorCode::AccountNotFound,
                format!("merge source account not found: {source_account_id}"),
            ));
        }

        tracing::info!(
            source_account_id = %source_account_id,
            target_account_id = %target_account_id,
            moved_files = moved_files,
            moved_identities = moved_identities,
            "accounts merged"
        );

        Ok(())
    })
}
