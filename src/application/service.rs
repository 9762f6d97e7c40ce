use std::path::Path;

use crate::domain::{
    Account, AccountId, IntegrityReport, Transaction, build_integrity_report, parse_balance,
    parse_transfer_amount,
};
use crate::storage::{LedgerStore, Repository, StoreConfig};

use super::AppError;

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, API, etc.).
///
/// It turns decimal text into exact amounts and store failures into
/// [`AppError`]s. It never locks: concurrency control belongs to the store.
pub struct LedgerService<S = Repository> {
    store: S,
}

impl LedgerService<Repository> {
    /// Initialize a new database at the given path.
    pub async fn init(
        database_path: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Result<Self, AppError> {
        let repo = Repository::init(database_path, config).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(
        database_path: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Result<Self, AppError> {
        let repo = Repository::connect(database_path, config).await?;
        Ok(Self::new(repo))
    }

    /// Release the connection pool.
    pub async fn close(&self) {
        self.store.close().await;
    }
}

impl<S: LedgerStore> LedgerService<S> {
    /// Create a new ledger service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================
    // Account operations
    // ========================

    /// Create an account with an opening balance given as decimal text.
    pub async fn create_account(
        &self,
        id: AccountId,
        initial_balance: &str,
    ) -> Result<Account, AppError> {
        let balance = parse_balance(initial_balance).map_err(AppError::invalid_balance)?;
        Ok(self.store.create_account(id, balance).await?)
    }

    /// Get an account (and its current balance).
    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        Ok(self.store.get_account(id).await?)
    }

    /// List all accounts.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.store.list_accounts().await?)
    }

    /// List the transactions touching an account, most recent first.
    pub async fn list_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(self.store.list_transactions(account_id).await?)
    }

    // ========================
    // Transfer operations
    // ========================

    /// Move an amount given as decimal text from `source` to `destination`.
    pub async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: &str,
    ) -> Result<Transaction, AppError> {
        let amount = parse_transfer_amount(amount).map_err(AppError::invalid_amount)?;
        if source == destination {
            return Err(AppError::SameAccount(source));
        }
        Ok(self.store.transfer(source, destination, amount).await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check ledger integrity and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let accounts = self.store.list_accounts().await?;
        let stats = self.store.integrity_stats().await?;

        Ok(build_integrity_report(
            &accounts,
            stats.transaction_count,
            stats.dangling_transactions,
            stats.non_positive_transactions,
        ))
    }
}
