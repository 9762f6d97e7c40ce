use serde::Serialize;
use thiserror::Error;

use crate::domain::{AccountId, Amount, ParseAmountError};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
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

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid balance: {0}")]
    InvalidBalance(String),

    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    #[error("Storage failure: {0}")]
    Storage(#[source] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Closed set of failure kinds a transport maps to its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InsufficientFunds,
    InvalidAmount,
    InvalidBalance,
    SameAccount,
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::InvalidBalance => "invalid_balance",
            ErrorKind::SameAccount => "same_account",
            ErrorKind::StorageFailure => "storage_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::AccountNotFound(_) => ErrorKind::NotFound,
            AppError::AccountAlreadyExists(_) => ErrorKind::AlreadyExists,
            AppError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AppError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            AppError::InvalidBalance(_) => ErrorKind::InvalidBalance,
            AppError::SameAccount(_) => ErrorKind::SameAccount,
            AppError::Storage(_) | AppError::Database(_) => ErrorKind::StorageFailure,
        }
    }

    /// True when the whole operation may be retried: it left no effects and
    /// a later attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Storage(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn invalid_amount(err: ParseAmountError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }

    pub(crate) fn invalid_balance(err: ParseAmountError) -> Self {
        AppError::InvalidBalance(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => AppError::AccountNotFound(id),
            StoreError::AccountAlreadyExists(id) => AppError::AccountAlreadyExists(id),
            StoreError::InsufficientFunds {
                account_id,
                balance,
                required,
            } => AppError::InsufficientFunds {
                account_id,
                balance,
                required,
            },
            StoreError::NonPositiveAmount(amount) => {
                AppError::InvalidAmount(format!("{} is not a positive amount", amount))
            }
            StoreError::NegativeBalance(balance) => {
                AppError::InvalidBalance(format!("{} is negative", balance))
            }
            StoreError::SameAccount(id) => AppError::SameAccount(id),
            other => AppError::Storage(other),
        }
    }
}
