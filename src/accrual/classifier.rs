use rust_decimal::Decimal;

use super::client::{FetchResult, RemoteStatus};
use crate::ledger::models::OrderStatus;

/// Why an order is left untouched for this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// REGISTERED or PROCESSING on the reward side
    NotFinal,
    /// Non-2xx answer other than 429
    ClientError(u16),
    /// PROCESSED with a negative amount
    NegativeAccrual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    RateLimited { retry_after_secs: u64 },
    Terminal { status: OrderStatus, amount: Decimal },
    Skip(SkipReason),
}

/// Map a reward-service result to what the reconciler should do with the order.
pub fn classify(result: &FetchResult) -> Classification {
    match result {
        FetchResult::Success {
            status: RemoteStatus::Processed,
            amount,
        } => {
            // A PROCESSED answer without an accrual credits nothing
            let amount = amount.unwrap_or(Decimal::ZERO);
            if amount.is_sign_negative() {
                Classification::Skip(SkipReason::NegativeAccrual)
            } else {
                Classification::Terminal {
                    status: OrderStatus::Processed,
                    amount,
                }
            }
        }
        FetchResult::Success {
            status: RemoteStatus::Invalid,
            ..
        }
        | FetchResult::NotRegistered => Classification::Terminal {
            status: OrderStatus::Invalid,
            amount: Decimal::ZERO,
        },
        FetchResult::Success {
            status: RemoteStatus::Registered | RemoteStatus::Processing,
            ..
        } => Classification::Skip(SkipReason::NotFinal),
        FetchResult::RateLimited { retry_after_secs } => Classification::RateLimited {
            retry_after_secs: *retry_after_secs,
        },
        FetchResult::TransientError(_) => Classification::Retryable,
        FetchResult::ClientError(code) => Classification::Skip(SkipReason::ClientError(*code)),
    }
}
