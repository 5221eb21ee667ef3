use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, info};

use super::models::*;
use super::store::LedgerStore;
use crate::error::{AppError, AppResult};

/// Ledger repository - THE source of truth for orders and balances
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    // ========== RECONCILIATION ==========

    async fn fetch_pending(&self) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, owner_id, status, accrual, created_at
            FROM orders
            WHERE status NOT IN ('invalid', 'processed')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn commit_outcome(
        &self,
        order: &Order,
        new_status: OrderStatus,
        amount: Decimal,
    ) -> AppResult<()> {
        if !new_status.is_terminal() {
            return Err(AppError::InvalidInput(format!(
                "cannot commit non-terminal status {} for order {}",
                new_status, order.number
            )));
        }
        if amount.is_sign_negative() {
            return Err(AppError::InvalidInput(format!(
                "negative accrual {} for order {}",
                amount, order.number
            )));
        }

        let accrual = match new_status {
            OrderStatus::Processed => amount,
            _ => Decimal::ZERO,
        };

        let mut tx = self.pool.begin().await?;

        // Guarded flip: a terminal order is never touched twice
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, accrual = $2
            WHERE number = $3 AND status IN ('new', 'processing')
            "#,
        )
        .bind(new_status)
        .bind(accrual)
        .bind(&order.number)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::OrderAlreadyFinalized(order.number.clone()));
        }

        if new_status == OrderStatus::Processed {
            sqlx::query(
                r#"
                INSERT INTO accruals (order_number, owner_id, amount)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&order.number)
            .bind(order.owner_id)
            .bind(accrual)
            .execute(&mut *tx)
            .await?;

            // Row-level upsert serializes concurrent credits for the same owner
            sqlx::query(
                r#"
                INSERT INTO balances (owner_id, earned, withdrawn)
                VALUES ($1, $2, 0)
                ON CONFLICT (owner_id)
                DO UPDATE SET earned = balances.earned + EXCLUDED.earned
                "#,
            )
            .bind(order.owner_id)
            .bind(accrual)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            "Committed order {} as {} (accrual {})",
            order.number, new_status, accrual
        );
        Ok(())
    }

    // ========== ORDER OPERATIONS ==========

    async fn register_order(&self, owner_id: OwnerId, number: &OrderNumber) -> AppResult<RegisterOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (number, owner_id, status, accrual, created_at)
            VALUES ($1, $2, $3, 0, now())
            ON CONFLICT (number) DO NOTHING
            "#,
        )
        .bind(number.as_str())
        .bind(owner_id)
        .bind(OrderStatus::New)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            info!("Order {} registered for {}", number, owner_id);
            return Ok(RegisterOutcome::Accepted);
        }

        let existing_owner: OwnerId = sqlx::query_scalar(
            r#"
            SELECT owner_id FROM orders WHERE number = $1
            "#,
        )
        .bind(number.as_str())
        .fetch_one(&self.pool)
        .await?;

        if existing_owner == owner_id {
            Ok(RegisterOutcome::AlreadyUploaded)
        } else {
            Err(AppError::OrderOwnedByAnotherUser(number.to_string()))
        }
    }

    async fn list_orders(&self, owner_id: OwnerId) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, owner_id, status, accrual, created_at
            FROM orders
            WHERE owner_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    // ========== BALANCE OPERATIONS ==========

    async fn balance(&self, owner_id: OwnerId) -> AppResult<Balance> {
        let balance = sqlx::query_as::<_, Balance>(
            r#"
            SELECT earned, withdrawn
            FROM balances
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or_default())
    }

    async fn withdraw(&self, owner_id: OwnerId, order_number: &OrderNumber, amount: Decimal) -> AppResult<()> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput("withdrawal sum must be positive".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE balances
            SET withdrawn = withdrawn + $1
            WHERE owner_id = $2 AND (earned - withdrawn) >= $1
            "#,
        )
        .bind(amount)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let available: Option<Decimal> = sqlx::query_scalar(
                r#"
                SELECT earned - withdrawn FROM balances WHERE owner_id = $1
                "#,
            )
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?;

            return Err(AppError::InsufficientFunds {
                required: amount.to_string(),
                available: available.unwrap_or(Decimal::ZERO).to_string(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO withdrawals (owner_id, order_number, amount, created_at)
            VALUES ($1, $2, $3, now())
            "#,
        )
        .bind(owner_id)
        .bind(order_number.as_str())
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Withdrawal of {} against order {} for {}", amount, order_number, owner_id);
        Ok(())
    }

    async fn list_withdrawals(&self, owner_id: OwnerId) -> AppResult<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT owner_id, order_number, amount, created_at
            FROM withdrawals
            WHERE owner_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
