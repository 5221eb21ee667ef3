mod accrual;
mod api;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod middleware;
mod server;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,accrual_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting accrual backend");

    let config = config::Config::from_env().context("failed to load configuration")?;
    info!("Configuration: {}", config);

    let (state, scheduler) = bootstrap::initialize_app_state(&config)
        .await
        .context("failed to initialize application")?;

    let shutdown = CancellationToken::new();
    let scheduler_handle = scheduler.start(shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let app = server::create_app(state);
    let served = server::run_server(app, &config.run_address, shutdown.clone()).await;

    // Stop the scheduler even when the listener failed on its own
    shutdown.cancel();
    if let Err(e) = scheduler_handle.await {
        error!("Accrual scheduler task failed: {}", e);
    }

    served.with_context(|| format!("server on {} failed", config.run_address))?;
    info!("Shutdown complete");
    Ok(())
}
