use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use echolink_account::models::NewFileRecord;
use echolink_account::schema::files;

/// Connect to the database named by TEST_DATABASE_URL and wrap the whole
/// test in a transaction that is rolled back on drop. Returns None (test
/// skips) when the variable is unset or the database is unreachable.
pub fn try_conn() -> Option<PgConnection> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let mut conn = PgConnection::establish(&url).ok()?;
    conn.begin_test_transaction().ok()?;
    Some(conn)
}

pub fn seed_file(conn: &mut PgConnection, account_id: Uuid, identity_id: Option<Uuid>, size_bytes: i64) {
    let record = NewFileRecord {
        account_id,
        upload_identity_id: identity_id,
        storage_key: format!("files/{}", Uuid::new_v4()),
        size_bytes,
    };

    diesel::insert_into(files::table)
        .values(&record)
        .execute(conn)
        .expect("failed to seed file row");
}
