use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Amount;

/// Externally assigned, immutable account identity.
pub type AccountId = i64;

/// An account holding a non-negative balance.
/// Balances change only through transfers once the account exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "account_id")]
    pub id: AccountId,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, balance: Amount) -> Self {
        Self {
            id,
            balance,
            created_at: Utc::now(),
        }
    }
}
