use std::time::Duration;

use thiserror::Error;

use crate::domain::{AccountId, Amount};

/// Failures returned by a [`LedgerStore`](super::LedgerStore).
///
/// Every failure inside a unit of work is reported only after that unit of
/// work has been rolled back.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(AccountId),

    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Amount,
        required: Amount,
    },

    #[error("Transfer amount must be positive: {0}")]
    NonPositiveAmount(Amount),

    #[error("Initial balance must not be negative: {0}")]
    NegativeBalance(Amount),

    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountId),

    #[error("Stored {column} is not valid: {value:?}")]
    CorruptValue { column: &'static str, value: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQLITE_BUSY and SQLITE_LOCKED primary result codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl StoreError {
    /// True for infrastructure faults as opposed to domain rejections.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::BalanceOverflow(_)
                | StoreError::CorruptValue { .. }
                | StoreError::Timeout(_)
                | StoreError::Database(_)
        )
    }

    /// True when the failed operation left no effects and can be retried as a whole.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Timeout(_) => true,
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            StoreError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        }
    }
}
