use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::{
        handler::{
            engine_status, get_balance, health_check, list_orders, list_withdrawals, upload_order,
            withdraw, AppState,
        },
        models::WithdrawRequest,
    },
    middleware::{create_cors_layer, rate_limit_middleware, validate_json},
};

pub fn create_app(state: AppState) -> Router {
    info!("Setting up HTTP routes...");

    let user_routes = Router::new()
        .route("/orders", post(upload_order).get(list_orders))
        .route("/balance", get(get_balance))
        .route(
            "/balance/withdraw",
            post(withdraw).route_layer(from_fn(validate_json::<WithdrawRequest>)),
        )
        .route("/withdrawals", get(list_withdrawals));

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .route("/api/v1/accrual/status", get(engine_status))
        .nest(
            "/api/user",
            user_routes.layer(from_fn_with_state(state.clone(), rate_limit_middleware)),
        )
        .layer(CompressionLayer::new())
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("HTTP routes configured");
    app
}

/// Serve until `shutdown` is cancelled; in-flight requests are drained first.
pub async fn run_server(
    app: Router,
    bind_address: &str,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
