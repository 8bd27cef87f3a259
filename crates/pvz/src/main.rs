use anyhow::{Context, Result};
use pvz::state::AppState;
use shared::config::{Config, ConnectionManager, ConnectionPool};
use shared::utils::{init_logger, shutdown_signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logger("pvz");

    let config = Config::init().context("Failed to load configuration")?;
    let token = CancellationToken::new();

    let pool = ConnectionManager::new_pool(
        &config.database_url,
        config.db_min_conn,
        config.db_max_conn,
    )
    .await
    .context("Failed to initialize database pool")?;

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let state = AppState::new(pool, &config, &token)
        .await
        .context("Failed to assemble application state")?;

    state.outbox_pool.start();
    state.consumer.start();

    info!("✅ PVZ order service started");

    shutdown_signal(token.clone()).await;

    info!("🛑 Shutting down...");
    state.audit_logger.shutdown().await;
    state.outbox_pool.stop().await;
    state.consumer.stop().await;

    info!("✅ PVZ order service shutdown complete");
    Ok(())
}

async fn run_migrations(pool: &ConnectionPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    Ok(())
}
