mod common;

use echolink_account::config::UploadLimits;
use echolink_account::models::IdentityKind;
use echolink_account::services::{account_service, identity_service, limits_service};

#[test]
fn stats_aggregate_seeded_files() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let account = account_service::create_account(&mut conn, None).unwrap();
    common::seed_file(&mut conn, account.id, None, 100);
    common::seed_file(&mut conn, account.id, None, 250);
    common::seed_file(&mut conn, account.id, None, 650);

    let stats = account_service::get_account_stats(&mut conn, account.id).unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.total_bytes, 1000);
    // everything was just inserted, so it all falls inside the window
    assert_eq!(stats.files_last_24h, 3);
    assert_eq!(stats.bytes_last_24h, 1000);
}

#[test]
fn stats_for_empty_account_are_zero() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let account = account_service::create_account(&mut conn, None).unwrap();
    let stats = account_service::get_account_stats(&mut conn, account.id).unwrap();
    assert_eq!(stats.total_files, 0);
    assert_eq!(stats.total_bytes, 0);
}

#[test]
fn upload_denied_at_file_count_limit() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let limits = UploadLimits {
        max_files_per_day: 2,
        ..Default::default()
    };

    let account = account_service::create_account(&mut conn, None).unwrap();
    common::seed_file(&mut conn, account.id, None, 10);

    let under = limits_service::assert_upload_allowed_for_account(&mut conn, &limits, account.id, 10).unwrap();
    assert!(under.allowed);

    common::seed_file(&mut conn, account.id, None, 10);

    let at = limits_service::assert_upload_allowed_for_account(&mut conn, &limits, account.id, 10).unwrap();
    assert!(!at.allowed);
    assert!(at.reason.unwrap().contains("Daily file limit"));
}

#[test]
fn quota_spans_all_identities_of_the_account() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let web = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::WebUser,
        "user-q",
        Some("q@x.com"),
        None,
    )
    .unwrap();
    let account_id = web.account_id.unwrap();

    let discord = identity_service::create_upload_identity(
        &mut conn,
        Some(account_id),
        IdentityKind::DiscordUser,
        "d-900",
        None,
        None,
    )
    .unwrap();

    // uploads through both surfaces count against the one account
    common::seed_file(&mut conn, account_id, Some(web.id), 600);
    common::seed_file(&mut conn, account_id, Some(discord.id), 400);

    let limits = UploadLimits {
        max_bytes_per_day: 1000,
        ..Default::default()
    };

    let denied = limits_service::assert_upload_allowed(&mut conn, &limits, &web, 1).unwrap();
    assert!(!denied.allowed);
    assert!(denied.reason.unwrap().contains("Daily upload limit"));
}

#[test]
fn identity_stats_are_scoped_to_one_surface() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let web = identity_service::get_or_create_upload_identity(
        &mut conn,
        IdentityKind::WebUser,
        "user-s",
        Some("s@x.com"),
        None,
    )
    .unwrap();
    let account_id = web.account_id.unwrap();
    let discord = identity_service::create_upload_identity(
        &mut conn,
        Some(account_id),
        IdentityKind::DiscordUser,
        "d-902",
        None,
        None,
    )
    .unwrap();

    common::seed_file(&mut conn, account_id, Some(web.id), 100);
    common::seed_file(&mut conn, account_id, Some(discord.id), 900);

    let web_stats = identity_service::get_upload_identity_stats(&mut conn, web.id).unwrap();
    assert_eq!(web_stats.total_files, 1);
    assert_eq!(web_stats.total_bytes, 100);

    let account_stats = account_service::get_account_stats(&mut conn, account_id).unwrap();
    assert_eq!(account_stats.total_files, 2);
    assert_eq!(account_stats.total_bytes, 1000);
}

#[test]
fn identity_without_account_fails_open() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let identity = identity_service::create_upload_identity(
        &mut conn,
        None,
        IdentityKind::DiscordUser,
        "d-901",
        None,
        None,
    )
    .unwrap();

    let limits = UploadLimits::default();
    let result = limits_service::assert_upload_allowed(&mut conn, &limits, &identity, 1).unwrap();
    assert!(result.allowed);
}

#[test]
fn merge_does_not_revalidate_quota() {
    let Some(mut conn) = common::try_conn() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let limits = UploadLimits {
        max_total_bytes: 1000,
        ..Default::default()
    };

    let source = account_service::create_account(&mut conn, None).unwrap();
    let target = account_service::create_account(&mut conn, None).unwrap();
    common::seed_file(&mut conn, source.id, None, 800);
    common::seed_file(&mut conn, target.id, None, 700);

    // merging pushes the target over its storage limit without error
    account_service::merge_accounts(&mut conn, source.id, target.id).unwrap();

    let stats = account_service::get_account_stats(&mut conn, target.id).unwrap();
    assert_eq!(stats.total_bytes, 1500);

    // enforcement only happens on the next upload check
    let next = limits_service::assert_upload_allowed_for_account(&mut conn, &limits, target.id, 1).unwrap();
    assert!(!next.allowed);
}
