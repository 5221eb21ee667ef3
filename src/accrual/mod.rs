// Accrual reconciliation engine
pub mod classifier;
pub mod client;
pub mod reconciler;
pub mod scheduler;

#[cfg(test)]
pub mod testing;

pub use client::HttpRewardClient;
pub use reconciler::OrderReconciler;
pub use scheduler::{EngineStatus, ReconciliationScheduler, SchedulerConfig, TickReport};
