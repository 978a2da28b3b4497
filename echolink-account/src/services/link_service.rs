use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use rand::RngCore;
use serde::Serialize;
use uuid::Uuid;

use echolink_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    DiscordLinkRequest, IdentityKind, IdentityMetadata, LinkRequestState, NewDiscordLinkRequest,
};
use crate::schema::discord_link_requests;
use crate::services::{account_service, identity_service};

/// Link codes stay redeemable for 30 minutes.
const LINK_CODE_EXPIRATION_MINUTES: i64 = 30;

/// Readable alphabet: no 0/O and no 1/I.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Codes collide roughly once per billion; the insert retries on the
/// unique constraint instead of checking beforehand.
const CODE_INSERT_ATTEMPTS: usize = 5;

#[derive(Debug, Serialize)]
pub struct CreateLinkRequestResult {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Linked,
    AlreadyLinked,
    Merged,
}

#[derive(Debug, Serialize)]
pub struct LinkResult {
    pub status: LinkStatus,
    pub account_id: Uuid,
    pub identity_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_from_account_id: Option<Uuid>,
}

/// Generate a short human-enterable code, format `XXX-XXX`.
pub fn generate_link_code() -> String {
    let mut bytes = [0u8; 6];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    let mut code = String::with_capacity(7);
    for (i, byte) in bytes.iter().enumerate() {
        // 256 is a multiple of the alphabet size, so the modulo is unbiased
        code.push(CODE_ALPHABET[*byte as usize % CODE_ALPHABET.len()] as char);
        if i == 2 {
            code.push('-');
        }
    }

    code
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Issue a fresh link code for `account_id`. Every unused code the account
/// still has is invalidated first, so at most one code is redeemable per
/// account at any time.
pub fn create_link_request(conn: &mut PgConnection, account_id: Uuid) -> AppResult<CreateLinkRequestResult> {
    diesel::update(
        discord_link_requests::table
            .filter(discord_link_requests::account_id.eq(account_id))
            .filter(discord_link_requests::used_at.is_null()),
    )
    .set(discord_link_requests::used_at.eq(Utc::now()))
    .execute(conn)?;

    let expires_at = Utc::now() + Duration::minutes(LINK_CODE_EXPIRATION_MINUTES);

    let mut last_conflict = None;
    for _ in 0..CODE_INSERT_ATTEMPTS {
        let code = generate_link_code();
        let new_request = NewDiscordLinkRequest {
            account_id,
            code: code.clone(),
            expires_at,
        };

        match diesel::insert_into(discord_link_requests::table)
            .values(&new_request)
            .execute(conn)
        {
            Ok(_) => {
                tracing::info!(
                    account_id = %account_id,
                    expires_at = %expires_at,
                    "discord link request created"
                );
                return Ok(CreateLinkRequestResult { code, expires_at });
            }
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
                last_conflict = Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(last_conflict
        .map(AppError::from)
        .unwrap_or_else(|| AppError::internal("link code generation exhausted retries")))
}

pub fn get_link_request_by_code(conn: &mut PgConnection, code: &str) -> AppResult<Option<DiscordLinkRequest>> {
    let request = discord_link_requests::table
        .filter(discord_link_requests::code.eq(normalize_code(code)))
        .first::<DiscordLinkRequest>(conn)
        .optional()?;
    Ok(request)
}

/// Redeem `code` for a Discord user, attaching (or merging) their identity
/// into the code's target account.
///
/// The whole redemption runs in one transaction that starts by claiming
/// `used_at` with a conditional update. Concurrent redeemers of the same
/// code serialize on that row: the loser observes the claim and fails with
/// `LinkCodeExpired`, and a failure later in the transaction (e.g. mid
/// merge) rolls the claim back so the code stays redeemable.
pub fn redeem_link_code(
    conn: &mut PgConnection,
    code: &str,
    discord_user_id: &str,
    discord_user_name: Option<&str>,
    discord_guild_id: Option<&str>,
) -> AppResult<LinkResult> {
    let request = get_link_request_by_code(conn, code)?
        .ok_or_else(|| AppError::new(ErrorCode::InvalidLinkCode, "Ce code de liaison est invalide."))?;

    match request.state(Utc::now()) {
        LinkRequestState::Used(_) => {
            return Err(AppError::new(ErrorCode::LinkCodeExpired, "Ce code a déjà été utilisé."));
        }
        LinkRequestState::Expired => {
            return Err(AppError::new(
                ErrorCode::LinkCodeExpired,
                "Ce code a expiré. Génère un nouveau code depuis l'interface Echo-Link.",
            ));
        }
        LinkRequestState::Pending => {}
    }

    let target_account_id = request.account_id;

    conn.transaction::<_, AppError, _>(|conn| {
        let claimed = diesel::update(
            discord_link_requests::table
                .filter(discord_link_requests::id.eq(request.id))
                .filter(discord_link_requests::used_at.is_null()),
        )
        .set(discord_link_requests::used_at.eq(Utc::now()))
        .execute(conn)?;

        if claimed == 0 {
            return Err(AppError::new(ErrorCode::LinkCodeExpired, "Ce code a déjà été utilisé."));
        }

        let existing = identity_service::get_upload_identity_by_kind_and_external_id(
            conn,
            IdentityKind::DiscordUser,
            discord_user_id,
        )?;

        let result = match existing {
            None => {
                let metadata = IdentityMetadata {
                    guild_id: discord_guild_id.map(str::to_string),
                    ..Default::default()
                };
                let identity = identity_service::create_upload_identity(
                    conn,
                    Some(target_account_id),
                    IdentityKind::DiscordUser,
                    discord_user_id,
                    discord_user_name,
                    (!metadata.is_empty()).then_some(&metadata),
                )?;

                tracing::info!(
                    discord_user_id = %discord_user_id,
                    account_id = %target_account_id,
                    identity_id = %identity.id,
                    "discord user linked"
                );

                LinkResult {
                    status: LinkStatus::Linked,
                    account_id: target_account_id,
                    identity_id: identity.id,
                    merged_from_account_id: None,
                }
            }
            Some(identity) if identity.account_id == Some(target_account_id) => {
                tracing::info!(
                    discord_user_id = %discord_user_id,
                    account_id = %target_account_id,
                    "discord user already linked"
                );

                LinkResult {
                    status: LinkStatus::AlreadyLinked,
                    account_id: target_account_id,
                    identity_id: identity.id,
                    merged_from_account_id: None,
                }
            }
            Some(identity) => match identity.account_id {
                Some(source_account_id) => {
                    account_service::merge_accounts(conn, source_account_id, target_account_id)?;

                    tracing::info!(
                        discord_user_id = %discord_user_id,
                        source_account_id = %source_account_id,
                        target_account_id = %target_account_id,
                        "discord user merged into target account"
                    );

                    LinkResult {
                        status: LinkStatus::Merged,
                        account_id: target_account_id,
                        identity_id: identity.id,
                        merged_from_account_id: Some(source_account_id),
                    }
                }
                None => {
                    // Pre-account-model row: nothing to merge, just adopt it.
                    tracing::warn!(
                        identity_id = %identity.id,
                        "discord identity had no account, attaching to link target"
                    );
                    account_service::link_identity_to_account(conn, identity.id, target_account_id)?;

                    LinkResult {
                        status: LinkStatus::Linked,
                        account_id: target_account_id,
                        identity_id: identity.id,
                        merged_from_account_id: None,
                    }
                }
            },
        };

        Ok(result)
    })
}

/// Unused, unexpired requests for an account, newest first.
pub fn get_pending_link_requests_for_account(
    conn: &mut PgConnection,
    account_id: Uuid,
) -> AppResult<Vec<DiscordLinkRequest>> {
    let requests = discord_link_requests::table
        .filter(discord_link_requests::account_id.eq(account_id))
        .filter(discord_link_requests::used_at.is_null())
        .filter(discord_link_requests::expires_at.gt(Utc::now()))
        .order(discord_link_requests::created_at.desc())
        .load::<DiscordLinkRequest>(conn)?;
    Ok(requests)
}

/// Drop requests that have been expired for more than a day. Returns the
/// number of rows removed.
pub fn cleanup_expired_link_requests(conn: &mut PgConnection) -> AppResult<usize> {
    let cutoff = Utc::now() - Duration::days(1);
    let count = diesel::delete(
        discord_link_requests::table.filter(discord_link_requests::expires_at.lt(cutoff)),
    )
    .execute(conn)?;

    if count > 0 {
        tracing::info!(count = count, "expired discord link requests cleaned up");
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_code_char(c: char) -> bool {
        CODE_ALPHABET.contains(&(c as u8))
    }

    #[test]
    fn code_format_holds_over_many_draws() {
        for _ in 0..10_000 {
            let code = generate_link_code();
            assert_eq!(code.len(), 7);

            let (head, rest) = code.split_at(3);
            let (dash, tail) = rest.split_at(1);
            assert_eq!(dash, "-");
            assert!(head.chars().all(is_code_char), "bad code: {code}");
            assert!(tail.chars().all(is_code_char), "bad code: {code}");

            for ambiguous in ['0', 'O', '1', 'I'] {
                assert!(!code.contains(ambiguous), "ambiguous char in {code}");
            }
        }
    }

    #[test]
    fn codes_are_not_constant() {
        let first = generate_link_code();
        let distinct = (0..50).map(|_| generate_link_code()).any(|c| c != first);
        assert!(distinct);
    }

    #[test]
    fn normalization_uppercases_and_trims() {
        assert_eq!(normalize_code("  abc-d2f \n"), "ABC-D2F");
        assert_eq!(normalize_code("ABC-D2F"), "ABC-D2F");
    }
}
