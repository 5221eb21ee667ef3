use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use super::models::*;
use super::store::LedgerStore;
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct LedgerState {
    orders: HashMap<String, Order>,
    accruals: HashMap<String, (OwnerId, Decimal)>,
    balances: HashMap<OwnerId, Balance>,
    withdrawals: Vec<Withdrawal>,
    failing_commits: HashSet<String>,
    fetch_fails: bool,
}

/// In-memory ledger with the same transactional guarantees as the Postgres one.
///
/// Every operation holds the single state lock for its whole duration, which
/// plays the role of the database transaction.
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Insert an order in `New` status; successive calls get increasing timestamps.
    pub fn seed_order(&self, number: &str, owner_id: OwnerId) {
        let mut state = self.state.lock();
        let offset = Duration::milliseconds(state.orders.len() as i64);
        state.orders.insert(
            number.to_string(),
            Order {
                number: number.to_string(),
                owner_id,
                status: OrderStatus::New,
                accrual: Decimal::ZERO,
                created_at: Utc::now() + offset,
            },
        );
    }

    pub fn seed_balance(&self, owner_id: OwnerId, balance: Balance) {
        self.state.lock().balances.insert(owner_id, balance);
    }

    pub fn fail_commits_for(&self, number: &str) {
        self.state.lock().failing_commits.insert(number.to_string());
    }

    pub fn set_fetch_fails(&self, fails: bool) {
        self.state.lock().fetch_fails = fails;
    }

    pub fn order(&self, number: &str) -> Option<Order> {
        self.state.lock().orders.get(number).cloned()
    }

    pub fn accrual_count(&self) -> usize {
        self.state.lock().accruals.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn fetch_pending(&self) -> AppResult<Vec<Order>> {
        let state = self.state.lock();
        if state.fetch_fails {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut pending: Vec<Order> = state
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect();
        pending.sort_by_key(|o| o.created_at);
        Ok(pending)
    }

    async fn commit_outcome(
        &self,
        order: &Order,
        new_status: OrderStatus,
        amount: Decimal,
    ) -> AppResult<()> {
        if !new_status.is_terminal() || amount.is_sign_negative() {
            return Err(AppError::InvalidInput(format!(
                "invalid commit {} / {} for order {}",
                new_status, amount, order.number
            )));
        }

        let mut state = self.state.lock();
        if state.failing_commits.contains(&order.number) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let stored = state
            .orders
            .get(&order.number)
            .ok_or_else(|| AppError::InvalidInput(format!("Order {} not found", order.number)))?;
        if stored.status.is_terminal() {
            return Err(AppError::OrderAlreadyFinalized(order.number.clone()));
        }
        if new_status == OrderStatus::Processed && state.accruals.contains_key(&order.number) {
            return Err(AppError::OrderAlreadyFinalized(order.number.clone()));
        }

        let accrual = match new_status {
            OrderStatus::Processed => amount,
            _ => Decimal::ZERO,
        };

        if let Some(stored) = state.orders.get_mut(&order.number) {
            stored.status = new_status;
            stored.accrual = accrual;
        }

        if new_status == OrderStatus::Processed {
            state
                .accruals
                .insert(order.number.clone(), (order.owner_id, accrual));
            state.balances.entry(order.owner_id).or_default().earned += accrual;
        }

        Ok(())
    }

    async fn register_order(&self, owner_id: OwnerId, number: &OrderNumber) -> AppResult<RegisterOutcome> {
        let mut state = self.state.lock();
        if let Some(existing) = state.orders.get(number.as_str()) {
            if existing.owner_id == owner_id {
                return Ok(RegisterOutcome::AlreadyUploaded);
            }
            return Err(AppError::OrderOwnedByAnotherUser(number.to_string()));
        }

        let offset = Duration::milliseconds(state.orders.len() as i64);
        state.orders.insert(
            number.to_string(),
            Order {
                number: number.to_string(),
                owner_id,
                status: OrderStatus::New,
                accrual: Decimal::ZERO,
                created_at: Utc::now() + offset,
            },
        );
        Ok(RegisterOutcome::Accepted)
    }

    async fn list_orders(&self, owner_id: OwnerId) -> AppResult<Vec<Order>> {
        let state = self.state.lock();
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.owner_id == owner_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn balance(&self, owner_id: OwnerId) -> AppResult<Balance> {
        Ok(self
            .state
            .lock()
            .balances
            .get(&owner_id)
            .copied()
            .unwrap_or_default())
    }

    async fn withdraw(&self, owner_id: OwnerId, order_number: &OrderNumber, amount: Decimal) -> AppResult<()> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput("withdrawal sum must be positive".to_string()));
        }

        let mut state = self.state.lock();
        let available = state
            .balances
            .get(&owner_id)
            .map(|b| b.current())
            .unwrap_or(Decimal::ZERO);
        if available < amount {
            return Err(AppError::InsufficientFunds {
                required: amount.to_string(),
                available: available.to_string(),
            });
        }

        state.balances.entry(owner_id).or_default().withdrawn += amount;
        state.withdrawals.push(Withdrawal {
            owner_id,
            order_number: order_number.to_string(),
            amount,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_withdrawals(&self, owner_id: OwnerId) -> AppResult<Vec<Withdrawal>> {
        Ok(self
            .state
            .lock()
            .withdrawals
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use uuid::Uuid;

    fn number(raw: &str) -> OrderNumber {
        OrderNumber::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_commits_for_same_owner_lose_no_update() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = Uuid::new_v4();
        ledger.seed_balance(
            owner,
            Balance {
                earned: dec!(100),
                withdrawn: dec!(0),
            },
        );
        ledger.seed_order("79927398713", owner);
        ledger.seed_order("4561261212345467", owner);

        let first = ledger.order("79927398713").unwrap();
        let second = ledger.order("4561261212345467").unwrap();

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .commit_outcome(&first, OrderStatus::Processed, dec!(50))
                    .await
            })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .commit_outcome(&second, OrderStatus::Processed, dec!(70))
                    .await
            })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let balance = ledger.balance(owner).await.unwrap();
        assert_eq!(balance.earned, dec!(220));
        assert_eq!(balance.withdrawn, dec!(0));
        assert_eq!(ledger.accrual_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_commit_leaves_balance_untouched() {
        let ledger = MemoryLedger::new();
        let owner = Uuid::new_v4();
        ledger.seed_order("79927398713", owner);
        let order = ledger.order("79927398713").unwrap();

        ledger
            .commit_outcome(&order, OrderStatus::Invalid, dec!(0))
            .await
            .unwrap();

        let stored = ledger.order("79927398713").unwrap();
        assert_eq!(stored.status, OrderStatus::Invalid);
        assert_eq!(stored.accrual, Decimal::ZERO);
        assert_eq!(ledger.balance(owner).await.unwrap(), Balance::default());
        assert!(ledger.fetch_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_commit_is_rejected() {
        let ledger = MemoryLedger::new();
        let owner = Uuid::new_v4();
        ledger.seed_order("79927398713", owner);
        let order = ledger.order("79927398713").unwrap();

        ledger
            .commit_outcome(&order, OrderStatus::Processed, dec!(10))
            .await
            .unwrap();
        let again = ledger
            .commit_outcome(&order, OrderStatus::Processed, dec!(10))
            .await;

        assert!(matches!(again, Err(AppError::OrderAlreadyFinalized(_))));
        assert_eq!(ledger.balance(owner).await.unwrap().earned, dec!(10));
    }

    #[tokio::test]
    async fn test_fetch_pending_oldest_first() {
        let ledger = MemoryLedger::new();
        let owner = Uuid::new_v4();
        ledger.seed_order("79927398713", owner);
        ledger.seed_order("4561261212345467", owner);
        ledger.seed_order("12345678903", owner);

        let pending = ledger.fetch_pending().await.unwrap();
        let numbers: Vec<&str> = pending.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, vec!["79927398713", "4561261212345467", "12345678903"]);
    }

    #[tokio::test]
    async fn test_register_order_ownership() {
        let ledger = MemoryLedger::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert_eq!(
            ledger.register_order(owner, &number("79927398713")).await.unwrap(),
            RegisterOutcome::Accepted
        );
        assert_eq!(
            ledger.register_order(owner, &number("79927398713")).await.unwrap(),
            RegisterOutcome::AlreadyUploaded
        );
        assert!(matches!(
            ledger.register_order(other, &number("79927398713")).await,
            Err(AppError::OrderOwnedByAnotherUser(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_never_overdraws() {
        let ledger = MemoryLedger::new();
        let owner = Uuid::new_v4();
        ledger.seed_balance(
            owner,
            Balance {
                earned: dec!(100),
                withdrawn: dec!(0),
            },
        );

        ledger
            .withdraw(owner, &number("2377225624"), dec!(60))
            .await
            .unwrap();
        let overdraw = ledger.withdraw(owner, &number("2377225624"), dec!(60)).await;

        assert!(matches!(overdraw, Err(AppError::InsufficientFunds { .. })));
        let balance = ledger.balance(owner).await.unwrap();
        assert_eq!(balance.current(), dec!(40));
        assert_eq!(ledger.list_withdrawals(owner).await.unwrap().len(), 1);
    }
}
