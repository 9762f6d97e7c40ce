use async_trait::async_trait;

use crate::domain::{Account, AccountId, Amount, Transaction};

use super::StoreError;

/// Ledger-wide counters used by integrity checks.
#[derive(Debug, Clone, Default)]
pub struct IntegrityStats {
    pub transaction_count: i64,
    pub dangling_transactions: i64,
    pub non_positive_transactions: i64,
}

/// Durable account balances plus the append-only transaction log.
///
/// Implementations own all concurrency control: callers never lock.
/// `transfer` is a single unit of work; when it returns an error no balance
/// and no ledger entry has changed.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new account with a non-negative opening balance.
    async fn create_account(
        &self,
        id: AccountId,
        initial_balance: Amount,
    ) -> Result<Account, StoreError>;

    /// Current state of an existing account.
    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;

    /// All accounts. Order carries no meaning.
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Entries where `account_id` is source or destination, most recent first.
    async fn list_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Move `amount` from `source` to `destination` and record it.
    async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Amount,
    ) -> Result<Transaction, StoreError>;

    async fn integrity_stats(&self) -> Result<IntegrityStats, StoreError>;
}
