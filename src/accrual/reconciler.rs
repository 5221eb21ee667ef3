use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::classifier::{classify, Classification, SkipReason};
use super::client::{FetchResult, RewardClient};
use crate::ledger::{models::Order, models::OrderStatus, LedgerStore};

/// What happened to one order during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Committed(OrderStatus),
    Skipped,
    RateLimited { retry_after_secs: u64 },
    Failed,
}

/// Per-order workflow: one reward-service call, classify, commit terminal outcomes.
///
/// Never retries and never sleeps. A non-terminal order simply shows up again in
/// the next tick's pending set.
pub struct OrderReconciler {
    client: Arc<dyn RewardClient>,
    ledger: Arc<dyn LedgerStore>,
}

impl OrderReconciler {
    pub fn new(client: Arc<dyn RewardClient>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { client, ledger }
    }

    pub async fn process(&self, order: &Order, cancel: &CancellationToken) -> WorkerOutcome {
        let result = self.client.fetch(&order.number, cancel).await;
        debug!("Reward service answered {:?}", result);

        match classify(&result) {
            Classification::Terminal { status, amount } => {
                let commit = tokio::select! {
                    _ = cancel.cancelled() => {
                        warn!("Commit for order {} cancelled", order.number);
                        return WorkerOutcome::Failed;
                    }
                    commit = self.ledger.commit_outcome(order, status, amount) => commit,
                };

                match commit {
                    Ok(()) => {
                        info!("Order {} settled as {} (accrual {})", order.number, status, amount);
                        WorkerOutcome::Committed(status)
                    }
                    Err(e) => {
                        error!("Failed to commit order {}: {}", order.number, e);
                        WorkerOutcome::Failed
                    }
                }
            }
            Classification::Skip(SkipReason::NotFinal) => WorkerOutcome::Skipped,
            Classification::Skip(reason) => {
                warn!("Skipping order {} this cycle: {:?}", order.number, reason);
                WorkerOutcome::Skipped
            }
            Classification::RateLimited { retry_after_secs } => {
                warn!(
                    "Reward service rate limited order {} (retry after {}s)",
                    order.number, retry_after_secs
                );
                WorkerOutcome::RateLimited { retry_after_secs }
            }
            Classification::Retryable => {
                if let FetchResult::TransientError(reason) = &result {
                    warn!("Transient failure for order {}: {}", order.number, reason);
                }
                WorkerOutcome::Failed
            }
        }
    }
}
