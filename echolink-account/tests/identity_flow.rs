mod common;

use diesel::prelude::*;

use echolink_account::models::{IdentityKind, IdentityMetadata};
use echolink_account::schema::upload_identities;
use echolink_account::services::{account_service, identity_service};

#[test]
fn resolver_is_idempotent() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let first = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::WebUser,
        "user-123",
        Some("a@x.com"),
        None,
    )
    .unwrap();

    let second = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::WebUser,
        "user-123",
        None,
        None,
    )
    .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.account_id, second.account_id);

    let rows: i64 = upload_identities::table
        .filter(upload_identities::external_id.eq("user-123"))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn same_email_converges_on_one_account() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    // two different web user ids logging in with the same address
    let first = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::WebUser,
        "user-a",
        Some("shared@x.com"),
        None,
    )
    .unwrap();

    let second = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::WebUser,
        "user-b",
        Some("shared@x.com"),
        None,
    )
    .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.account_id, second.account_id);

    let account = account_service::get_account_by_id(&mut conn, first.account_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(account.primary_email.as_deref(), Some("shared@x.com"));
}

#[test]
fn discord_identity_gets_fresh_emailless_account() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let identity = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::DiscordUser,
        "111222333",
        Some("GrosChat"),
        None,
    )
    .unwrap();

    let account = account_service::get_account_by_id(&mut conn, identity.account_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(account.primary_email, None);
}

#[test]
fn web_login_without_email_display_name_gets_fresh_account() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let first = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::WebUser,
        "user-c",
        Some("not an email"),
        None,
    )
    .unwrap();

    let second = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::WebUser,
        "user-d",
        Some("not an email"),
        None,
    )
    .unwrap();

    // no email key to converge on, so the accounts stay separate
    assert_ne!(first.account_id, second.account_id);
}

#[test]
fn metadata_refresh_is_last_write_wins() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let old_meta = IdentityMetadata {
        guild_id: Some("guild-1".into()),
        avatar: Some("abc".into()),
        ..Default::default()
    };
    let created = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::DiscordUser,
        "444555666",
        Some("OldName"),
        Some(&old_meta),
    )
    .unwrap();

    let new_meta = IdentityMetadata {
        guild_id: Some("guild-2".into()),
        ..Default::default()
    };
    let refreshed = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::DiscordUser,
        "444555666",
        Some("NewName"),
        Some(&new_meta),
    )
    .unwrap();

    assert_eq!(refreshed.id, created.id);
    assert_eq!(refreshed.account_id, created.account_id);
    assert_eq!(refreshed.display_name.as_deref(), Some("NewName"));

    // whole-bag replacement, not a key merge: avatar is gone
    let stored = IdentityMetadata::from_value(refreshed.extra_metadata.as_ref().unwrap());
    assert_eq!(stored.guild_id.as_deref(), Some("guild-2"));
    assert_eq!(stored.avatar, None);
}

#[test]
fn account_email_can_be_updated() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let account = account_service::create_account(&mut conn, None).unwrap();
    let updated = account_service::update_account_email(&mut conn, account.id, "Late@X.com").unwrap();
    assert_eq!(updated.primary_email.as_deref(), Some("late@x.com"));

    let missing = account_service::update_account_email(&mut conn, uuid::Uuid::new_v4(), "a@x.com");
    assert!(missing.is_err());
}

#[test]
fn unlink_keeps_files_attributed_to_account() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let identity = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::DiscordUser,
        "777888999",
        None,
        None,
    )
    .unwrap();
    let account_id = identity.account_id.unwrap();

    common::seed_file(&mut conn, account_id, Some(identity.id), 1024);

    identity_service::delete_upload_identity(&mut conn, identity.id).unwrap();

    let stats = account_service::get_account_stats(&mut conn, account_id).unwrap();
    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.total_bytes, 1024);
}
