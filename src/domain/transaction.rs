use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Amount};

/// Store-assigned, monotonically increasing ledger entry identity.
pub type TransactionId = i64;

/// A committed movement of money between two accounts.
/// Ledger entries are append-only: never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Source account (balance decreased)
    pub source_account_id: AccountId,
    /// Destination account (balance increased)
    pub destination_account_id: AccountId,
    /// Amount moved (always positive)
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Amount,
    /// When the transfer was committed
    pub recorded_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed effect of this entry on `account_id`'s balance.
    pub fn effect_on(&self, account_id: AccountId) -> Amount {
        if self.source_account_id == account_id {
            -self.amount
        } else if self.destination_account_id == account_id {
            self.amount
        } else {
            Amount::ZERO
        }
    }
}
