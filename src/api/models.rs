use crate::accrual::TickReport;
use crate::ledger::models::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

// ========== REQUEST MODELS ==========

/// Request to spend part of the current balance against a new order number
#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawRequest {
    #[validate(length(min = 1, max = 32, message = "order must be between 1 and 32 characters"))]
    pub order: String,

    #[validate(custom = "validate_withdraw_sum")]
    pub sum: Decimal,
}

impl WithdrawRequest {
    /// Amount in ledger precision
    pub fn amount(&self) -> Decimal {
        self.sum.round_dp(2)
    }
}

fn validate_withdraw_sum(sum: &Decimal) -> Result<(), ValidationError> {
    if sum.round_dp(2) <= Decimal::ZERO {
        let mut error = ValidationError::new("withdraw_sum");
        error.message = Some("sum must be at least 0.01".into());
        return Err(error);
    }
    Ok(())
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    /// Only present once the order is PROCESSED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let accrual = (order.status == OrderStatus::Processed).then_some(order.accrual);
        Self {
            number: order.number,
            status: order.status,
            accrual,
            uploaded_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            current: balance.current(),
            withdrawn: balance.withdrawn,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            order: withdrawal.order_number,
            sum: withdrawal.amount,
            processed_at: withdrawal.created_at,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub database_reachable: bool,
    pub reconciliation_ticks: u64,
}

#[derive(Debug, Serialize)]
pub struct TickReportResponse {
    pub started_at: DateTime<Utc>,
    pub pending: usize,
    pub committed: usize,
    pub skipped: usize,
    pub rate_limited: usize,
    pub failed: usize,
    pub fetch_failed: bool,
    pub next_interval_secs: u64,
}

impl From<TickReport> for TickReportResponse {
    fn from(report: TickReport) -> Self {
        Self {
            started_at: report.started_at,
            pending: report.pending,
            committed: report.committed,
            skipped: report.skipped,
            rate_limited: report.rate_limited,
            failed: report.failed,
            fetch_failed: report.fetch_failed,
            next_interval_secs: report.next_interval.as_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EngineStatusResponse {
    pub ticks: u64,
    pub last_tick: Option<TickReportResponse>,
}
