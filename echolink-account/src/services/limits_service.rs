use diesel::pg::PgConnection;
use serde::Serialize;
use uuid::Uuid;

use echolink_shared::errors::AppResult;

use crate::config::UploadLimits;
use crate::models::{AccountStats, UploadIdentity};
use crate::services::account_service;

#[derive(Debug, Serialize)]
pub struct UploadLimitResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl UploadLimitResult {
    fn allowed() -> Self {
        Self { allowed: true, reason: None }
    }

    fn denied(reason: String) -> Self {
        Self { allowed: false, reason: Some(reason) }
    }
}

/// Decide whether an upload of `file_size_bytes` fits within `limits`,
/// given the account's current usage. Checks run in a fixed order and the
/// first failing one is reported:
/// daily file count, daily bytes, total file count, total bytes.
///
/// Landing exactly on a byte limit is allowed; one byte over is not.
pub fn evaluate(limits: &UploadLimits, stats: &AccountStats, file_size_bytes: i64) -> UploadLimitResult {
    if stats.files_last_24h >= limits.max_files_per_day {
        return UploadLimitResult::denied(format!(
            "Daily file limit reached ({} files per 24 hours). Try again later.",
            limits.max_files_per_day
        ));
    }

    if stats.bytes_last_24h + file_size_bytes > limits.max_bytes_per_day {
        return UploadLimitResult::denied(format!(
            "Daily upload limit reached ({} per 24 hours). Try again later.",
            format_bytes(limits.max_bytes_per_day)
        ));
    }

    if stats.total_files >= limits.max_total_files {
        return UploadLimitResult::denied(format!(
            "Total file limit reached ({} files). Please delete some files to continue uploading.",
            limits.max_total_files
        ));
    }

    if stats.total_bytes + file_size_bytes > limits.max_total_bytes {
        return UploadLimitResult::denied(format!(
            "Total storage limit reached ({}). Please delete some files to continue uploading.",
            format_bytes(limits.max_total_bytes)
        ));
    }

    UploadLimitResult::allowed()
}

/// Quota check for an identity, unified across all of its account's
/// surfaces. Read-only: the caller inserts the file row afterwards, so two
/// concurrent uploads can both pass and jointly overshoot a limit — an
/// accepted race in this design.
pub fn assert_upload_allowed(
    conn: &mut PgConnection,
    limits: &UploadLimits,
    identity: &UploadIdentity,
    file_size_bytes: i64,
) -> AppResult<UploadLimitResult> {
    let Some(account_id) = identity.account_id else {
        // Rows predating the account model have no account to meter
        // against; fail open rather than blocking the upload.
        tracing::warn!(
            identity_id = %identity.id,
            "identity has no account, allowing upload without quota check"
        );
        return Ok(UploadLimitResult::allowed());
    };

    assert_upload_allowed_for_account(conn, limits, account_id, file_size_bytes)
}

pub fn assert_upload_allowed_for_account(
    conn: &mut PgConnection,
    limits: &UploadLimits,
    account_id: Uuid,
    file_size_bytes: i64,
) -> AppResult<UploadLimitResult> {
    let stats = account_service::get_account_stats(conn, account_id)?;
    Ok(evaluate(limits, &stats, file_size_bytes))
}

pub fn format_bytes(bytes: i64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
