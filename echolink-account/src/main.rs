use std::sync::Arc;

use echolink_account::config::AppConfig;
use echolink_account::{build_router, AppState};
use echolink_shared::clients::db::create_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    echolink_shared::middleware::init_tracing("echolink-account");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url);

    let state = Arc::new(AppState { db, config });
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "echolink-account starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
