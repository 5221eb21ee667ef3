use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{
    accrual::{
        EngineStatus, HttpRewardClient, OrderReconciler, ReconciliationScheduler, SchedulerConfig,
    },
    api::handler::AppState,
    config::Config,
    error::AppResult,
    ledger::{LedgerRepository, LedgerStore},
    middleware::RateLimitLayer,
};

/// Wire the ledger, reward client and scheduler together.
///
/// The scheduler is returned unstarted so the caller owns its lifetime.
pub async fn initialize_app_state(config: &Config) -> AppResult<(AppState, ReconciliationScheduler)> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_uri, config.database_max_connections).await?;
    let ledger: Arc<dyn LedgerStore> = Arc::new(LedgerRepository::new(pool));

    let client = Arc::new(HttpRewardClient::new(
        &config.accrual_system_address,
        config.request_timeout(),
    )?);
    info!(
        "Reward client targets {} (timeout {:?})",
        config.accrual_system_address,
        config.request_timeout()
    );

    let reconciler = Arc::new(OrderReconciler::new(client, ledger.clone()));
    let engine_status = Arc::new(EngineStatus::new());
    let scheduler = ReconciliationScheduler::new(
        SchedulerConfig {
            base_interval: config.poll_interval(),
            worker_pool_size: config.accrual_worker_pool_size,
        },
        ledger.clone(),
        reconciler,
        engine_status.clone(),
    );

    let rate_limiter = Arc::new(RateLimitLayer::per_minute(config.api_rate_limit_per_minute)?);
    info!(
        "API rate limit: {} requests per minute",
        config.api_rate_limit_per_minute
    );

    let state = AppState {
        ledger,
        engine_status,
        rate_limiter,
    };

    Ok((state, scheduler))
}

async fn initialize_database(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("Database pool configured: {} max connections", max_connections);

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Database initialized");
    Ok(pool)
}
