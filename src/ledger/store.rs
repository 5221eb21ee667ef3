use async_trait::async_trait;
use rust_decimal::Decimal;

use super::models::{Balance, Order, OrderNumber, OrderStatus, OwnerId, RegisterOutcome, Withdrawal};
use crate::error::AppResult;

/// Persistence contract for orders, accruals and balances.
///
/// The accrual engine only consumes `fetch_pending` and `commit_outcome`; the
/// remaining operations back the user-facing HTTP surface.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All orders whose status is not terminal, oldest first.
    async fn fetch_pending(&self) -> AppResult<Vec<Order>>;

    /// Atomically move `order` to a terminal status.
    ///
    /// For `Processed` the same transaction records the accrual entry and adds
    /// `amount` to the owner's `earned` balance. On error nothing is applied.
    async fn commit_outcome(
        &self,
        order: &Order,
        new_status: OrderStatus,
        amount: Decimal,
    ) -> AppResult<()>;

    async fn register_order(&self, owner_id: OwnerId, number: &OrderNumber) -> AppResult<RegisterOutcome>;

    async fn list_orders(&self, owner_id: OwnerId) -> AppResult<Vec<Order>>;

    async fn balance(&self, owner_id: OwnerId) -> AppResult<Balance>;

    /// Debit `amount` from the owner's current balance, never letting it drop below zero.
    async fn withdraw(&self, owner_id: OwnerId, order_number: &OrderNumber, amount: Decimal) -> AppResult<()>;

    async fn list_withdrawals(&self, owner_id: OwnerId) -> AppResult<Vec<Withdrawal>>;

    async fn ping(&self) -> AppResult<()>;
}
