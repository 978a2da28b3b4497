use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{accounts, discord_link_requests, files, upload_identities};

// --- Accounts ---

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = accounts)]
pub struct Account {
    pub id: Uuid,
    pub primary_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount {
    pub primary_email: Option<String>,
}

/// Per-account usage aggregates, computed over the `files` table.
/// The 24h figures use a rolling window anchored at the query instant.
#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct AccountStats {
    #[diesel(sql_type = BigInt)]
    pub total_files: i64,
    #[diesel(sql_type = BigInt)]
    pub total_bytes: i64,
    #[diesel(sql_type = BigInt)]
    pub files_last_24h: i64,
    #[diesel(sql_type = BigInt)]
    pub bytes_last_24h: i64,
}

// --- Upload identities ---

/// Per-identity variant of [`AccountStats`], scoped to a single
/// authentication surface instead of the whole account.
#[derive(Debug, Clone, QueryableByName, Serialize)]
pub struct IdentityStats {
    #[diesel(sql_type = BigInt)]
    pub total_files: i64,
    #[diesel(sql_type = BigInt)]
    pub total_bytes: i64,
    #[diesel(sql_type = BigInt)]
    pub files_last_24h: i64,
    #[diesel(sql_type = BigInt)]
    pub bytes_last_24h: i64,
}

/// One authentication surface: a web email login or a Discord user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    WebUser,
    DiscordUser,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::WebUser => "web_user",
            IdentityKind::DiscordUser => "discord_user",
        }
    }
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web_user" => Ok(IdentityKind::WebUser),
            "discord_user" => Ok(IdentityKind::DiscordUser),
            _ => Err(format!("unknown identity kind: {s}")),
        }
    }
}

/// Closed set of keys carried in the identity metadata bag. The storage
/// column stays an open JSON object; only these keys cross the service
/// boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
}

impl IdentityMetadata {
    pub fn is_empty(&self) -> bool {
        self.guild_id.is_none() && self.avatar.is_none() && self.discriminator.is_none()
    }

    /// JSON representation for storage; empty bags collapse to NULL.
    pub fn to_value(&self) -> Option<serde_json::Value> {
        if self.is_empty() {
            None
        } else {
            serde_json::to_value(self).ok()
        }
    }

    /// Lenient read of a stored bag; unknown keys are dropped.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = upload_identities)]
pub struct UploadIdentity {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub kind: String,
    pub external_id: String,
    pub display_name: Option<String>,
    pub extra_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadIdentity {
    pub fn is_discord(&self) -> bool {
        self.kind == IdentityKind::DiscordUser.as_str()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = upload_identities)]
pub struct NewUploadIdentity {
    pub account_id: Option<Uuid>,
    pub kind: String,
    pub external_id: String,
    pub display_name: Option<String>,
    pub extra_metadata: Option<serde_json::Value>,
}

// --- Discord link requests ---

/// Validity of a link request, computed from the stored timestamps at read
/// time. The row itself only carries `expires_at` and a nullable `used_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRequestState {
    Pending,
    Used(DateTime<Utc>),
    Expired,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = discord_link_requests)]
pub struct DiscordLinkRequest {
    pub id: Uuid,
    pub account_id: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl DiscordLinkRequest {
    pub fn state(&self, now: DateTime<Utc>) -> LinkRequestState {
        if let Some(at) = self.used_at {
            LinkRequestState::Used(at)
        } else if now > self.expires_at {
            LinkRequestState::Expired
        } else {
            LinkRequestState::Pending
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = discord_link_requests)]
pub struct NewDiscordLinkRequest {
    pub account_id: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

// --- Files ---
// Owned by the file-storage service; modeled here because quota reads the
// table and account merge rewrites it.

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = files)]
pub struct FileRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub upload_identity_id: Option<Uuid>,
    pub storage_key: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = files)]
pub struct NewFileRecord {
    pub account_id: Uuid,
    pub upload_identity_id: Option<Uuid>,
    pub storage_key: String,
    pub size_bytes: i64,
}
