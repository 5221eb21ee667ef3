// Reconciliation Scheduler - owns the accrual poll loop
//
// Each tick:
// - Reset the interval hypothesis to the base interval
// - Fetch every pending order from the ledger
// - Reconcile them on a bounded worker pool and join all outcomes
// - Widen the next interval by the largest Retry-After seen, if any
//
// Per-order failures never cancel siblings; only rate limiting feeds back
// into scheduling.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use super::reconciler::{OrderReconciler, WorkerOutcome};
use crate::ledger::{models::Order, LedgerStore};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between ticks when the reward service is not pushing back
    pub base_interval: Duration,
    /// Maximum number of orders reconciled concurrently
    pub worker_pool_size: usize,
}

/// Summary of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub pending: usize,
    pub committed: usize,
    pub skipped: usize,
    pub rate_limited: usize,
    pub failed: usize,
    pub fetch_failed: bool,
    pub next_interval: Duration,
}

impl TickReport {
    fn empty(started_at: DateTime<Utc>, next_interval: Duration) -> Self {
        Self {
            started_at,
            pending: 0,
            committed: 0,
            skipped: 0,
            rate_limited: 0,
            failed: 0,
            fetch_failed: false,
            next_interval,
        }
    }

    fn from_outcomes(
        started_at: DateTime<Utc>,
        pending: usize,
        outcomes: &[WorkerOutcome],
        next_interval: Duration,
    ) -> Self {
        let mut report = Self::empty(started_at, next_interval);
        report.pending = pending;
        for outcome in outcomes {
            match outcome {
                WorkerOutcome::Committed(_) => report.committed += 1,
                WorkerOutcome::Skipped => report.skipped += 1,
                WorkerOutcome::RateLimited { .. } => report.rate_limited += 1,
                WorkerOutcome::Failed => report.failed += 1,
            }
        }
        report
    }
}

/// Latest scheduler state, shared with the HTTP layer
#[derive(Debug, Default)]
pub struct EngineStatus {
    last_tick: RwLock<Option<TickReport>>,
    ticks: AtomicU64,
}

impl EngineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, report: TickReport) {
        *self.last_tick.write() = Some(report);
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn last_tick(&self) -> Option<TickReport> {
        self.last_tick.read().clone()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

/// Upper bound on a single Retry-After hint
pub const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Base interval widened by the largest Retry-After among rate-limited outcomes.
///
/// The hint is capped at `MAX_RETRY_AFTER_SECS`.
pub fn next_interval(base: Duration, outcomes: &[WorkerOutcome]) -> Duration {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            WorkerOutcome::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        })
        .max()
        .map(|secs| base.saturating_add(Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS))))
        .unwrap_or(base)
}

pub struct ReconciliationScheduler {
    config: SchedulerConfig,
    ledger: Arc<dyn LedgerStore>,
    reconciler: Arc<OrderReconciler>,
    status: Arc<EngineStatus>,
}

impl ReconciliationScheduler {
    pub fn new(
        config: SchedulerConfig,
        ledger: Arc<dyn LedgerStore>,
        reconciler: Arc<OrderReconciler>,
        status: Arc<EngineStatus>,
    ) -> Self {
        Self {
            config,
            ledger,
            reconciler,
            status,
        }
    }

    /// Start the scheduler (runs in background until `cancel` fires)
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Accrual scheduler started: base interval {:?}, {} workers",
            self.config.base_interval, self.config.worker_pool_size
        );

        let mut current_interval = self.config.base_interval;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(current_interval) => {}
            }

            let report = self.run_tick(&cancel).await;
            current_interval = report.next_interval;

            if cancel.is_cancelled() {
                break;
            }
        }

        info!("Accrual scheduler stopped");
    }

    /// Execute one reconciliation cycle and publish its report.
    pub async fn run_tick(&self, cancel: &CancellationToken) -> TickReport {
        let base = self.config.base_interval;
        let started_at = Utc::now();

        let orders = match self.ledger.fetch_pending().await {
            Ok(orders) => orders,
            Err(e) => {
                error!("Failed to fetch pending orders: {}", e);
                let mut report = TickReport::empty(started_at, base);
                report.fetch_failed = true;
                self.status.publish(report.clone());
                return report;
            }
        };

        if orders.is_empty() {
            debug!("No pending orders");
            let report = TickReport::empty(started_at, base);
            self.status.publish(report.clone());
            return report;
        }

        let pending = orders.len();
        let outcomes = self.reconcile_all(orders, cancel).await;
        let report = TickReport::from_outcomes(started_at, pending, &outcomes, next_interval(base, &outcomes));

        info!(
            "Accrual tick: {} pending, {} committed, {} skipped, {} rate limited, {} failed, next in {:?}",
            report.pending,
            report.committed,
            report.skipped,
            report.rate_limited,
            report.failed,
            report.next_interval
        );

        self.status.publish(report.clone());
        report
    }

    async fn reconcile_all(&self, orders: Vec<Order>, cancel: &CancellationToken) -> Vec<WorkerOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.worker_pool_size));
        let mut workers = JoinSet::new();
        let total = orders.len();

        for order in orders {
            if cancel.is_cancelled() {
                break;
            }

            // Acquired before spawning so at most `worker_pool_size` tasks exist at once
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let reconciler = self.reconciler.clone();
            let cancel = cancel.clone();
            let span = info_span!("reconcile", order = %order.number);

            workers.spawn(
                async move {
                    let _permit = permit;
                    reconciler.process(&order, &cancel).await
                }
                .instrument(span),
            );
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Reconciliation worker aborted: {}", e);
                    outcomes.push(WorkerOutcome::Failed);
                }
            }
        }

        outcomes
    }
}
