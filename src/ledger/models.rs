use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Identity of the user owning orders and a balance
pub type OwnerId = Uuid;

/// Order status enum
///
/// `Invalid` and `Processed` are terminal: once reached, the order is never
/// returned by `LedgerStore::fetch_pending` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Processing => "processing",
            OrderStatus::Invalid => "invalid",
            OrderStatus::Processed => "processed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderNumberError {
    #[error("order number is empty")]
    Empty,
    #[error("order number contains a non-digit character")]
    NonNumeric,
    #[error("order number fails the Luhn checksum")]
    ChecksumMismatch,
    #[error("order number is longer than 32 digits")]
    TooLong,
}

/// Width of the `orders.number` column
pub const MAX_ORDER_NUMBER_LEN: usize = 32;

/// A digit string that passed the Luhn check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn parse(raw: &str) -> Result<Self, OrderNumberError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(OrderNumberError::Empty);
        }
        if raw.len() > MAX_ORDER_NUMBER_LEN {
            return Err(OrderNumberError::TooLong);
        }

        let mut sum = 0u32;
        // Walk right to left, doubling every second digit
        for (position, ch) in raw.chars().rev().enumerate() {
            let mut digit = ch.to_digit(10).ok_or(OrderNumberError::NonNumeric)?;
            if position % 2 == 1 {
                digit *= 2;
                if digit > 9 {
                    digit -= 9;
                }
            }
            sum += digit;
        }

        if sum % 10 != 0 {
            return Err(OrderNumberError::ChecksumMismatch);
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(value: OrderNumber) -> Self {
        value.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub number: String,
    pub owner_id: OwnerId,
    pub status: OrderStatus,
    pub accrual: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Per-owner bonus aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub earned: Decimal,
    pub withdrawn: Decimal,
}

impl Balance {
    pub fn current(&self) -> Decimal {
        self.earned - self.withdrawn
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self {
            earned: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
        }
    }
}

/// Withdrawal entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub owner_id: OwnerId,
    pub order_number: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Result of uploading an order number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Accepted,
    AlreadyUploaded,
}
