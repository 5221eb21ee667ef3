use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::identity::Identity;
use super::models::*;
use crate::{
    accrual::EngineStatus,
    error::{AppError, AppResult},
    ledger::{
        models::{OrderNumber, RegisterOutcome},
        LedgerStore,
    },
    middleware::RateLimitLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub engine_status: Arc<EngineStatus>,
    pub rate_limiter: Arc<RateLimitLayer>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let database_reachable = match state.ledger.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check could not reach the database: {}", e);
            false
        }
    };

    Ok(Json(HealthResponse {
        status: if database_reachable {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: Utc::now(),
        database_reachable,
        reconciliation_ticks: state.engine_status.ticks(),
    }))
}

/// GET /api/v1/accrual/status - last reconciliation tick summary
pub async fn engine_status(State(state): State<AppState>) -> AppResult<Json<EngineStatusResponse>> {
    Ok(Json(EngineStatusResponse {
        ticks: state.engine_status.ticks(),
        last_tick: state.engine_status.last_tick().map(TickReportResponse::from),
    }))
}

/// POST /api/user/orders - body is the bare order number
pub async fn upload_order(
    State(state): State<AppState>,
    Identity(owner_id): Identity,
    body: String,
) -> AppResult<StatusCode> {
    let number = OrderNumber::parse(&body)
        .map_err(|e| AppError::InvalidOrderNumber(format!("{}: {}", body.trim(), e)))?;

    match state.ledger.register_order(owner_id, &number).await? {
        RegisterOutcome::Accepted => {
            info!("Order {} accepted for owner {}", number, owner_id);
            Ok(StatusCode::ACCEPTED)
        }
        RegisterOutcome::AlreadyUploaded => Ok(StatusCode::OK),
    }
}

/// GET /api/user/orders - oldest first, 204 when there are none
pub async fn list_orders(
    State(state): State<AppState>,
    Identity(owner_id): Identity,
) -> AppResult<Response> {
    let orders = state.ledger.list_orders(owner_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let orders: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(orders).into_response())
}

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Identity(owner_id): Identity,
) -> AppResult<Json<BalanceResponse>> {
    let balance = state.ledger.balance(owner_id).await?;
    Ok(Json(BalanceResponse::from(balance)))
}

/// POST /api/user/balance/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Identity(owner_id): Identity,
    Json(request): Json<WithdrawRequest>,
) -> AppResult<StatusCode> {
    let number = OrderNumber::parse(&request.order)
        .map_err(|e| AppError::InvalidOrderNumber(format!("{}: {}", request.order, e)))?;
    let amount = request.amount();

    info!("Withdrawing {} against order {} for owner {}", amount, number, owner_id);
    state.ledger.withdraw(owner_id, &number, amount).await?;

    Ok(StatusCode::OK)
}

/// GET /api/user/withdrawals - oldest first, 204 when there are none
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Identity(owner_id): Identity,
) -> AppResult<Response> {
    let withdrawals = state.ledger.list_withdrawals(owner_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let withdrawals: Vec<WithdrawalResponse> = withdrawals
        .into_iter()
        .map(WithdrawalResponse::from)
        .collect();
    Ok(Json(withdrawals).into_response())
}
