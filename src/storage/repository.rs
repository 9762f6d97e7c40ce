use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::domain::{Account, AccountId, Amount, Transaction, exact_add, exact_sub};

use super::{IntegrityStats, LedgerStore, MIGRATION_001_INITIAL, StoreConfig, StoreError};

/// SQLite-backed ledger store.
///
/// A transfer runs inside one SQLite transaction. Its first statement is a
/// write against the source row, so the database write lock is taken before
/// any balance is read and held until commit or rollback. Concurrent
/// transfers queue on that lock (up to the busy timeout) instead of reading
/// stale balances.
pub struct Repository {
    pool: SqlitePool,
    config: StoreConfig,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool, config: StoreConfig) -> Self {
        Self { pool, config }
    }

    /// Connect to an existing SQLite database.
    pub async fn connect(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Self::open(path.as_ref(), config, false).await
    }

    /// Initialize a database (create file if missing + migrate).
    pub async fn init(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let repo = Self::open(path.as_ref(), config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn open(path: &Path, config: StoreConfig, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", path.display()))?;

        debug!(path = %path.display(), max_connections = config.max_connections, "Connected");
        Ok(Self::new(pool, config))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Close every pooled connection. Pending operations finish first.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Bound a read-only `operation` by the configured deadline.
    async fn bounded<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let deadline = self.config.operation_timeout;
        time::timeout(deadline, operation)
            .await
            .unwrap_or(Err(StoreError::Timeout(deadline)))
    }

    /// Open a unit of work. Waiting for a pooled connection counts against
    /// the deadline.
    async fn begin_by(
        &self,
        expires: Instant,
        deadline: Duration,
    ) -> Result<sqlx::Transaction<'static, Sqlite>, StoreError> {
        match time::timeout_at(expires, self.pool.begin()).await {
            Ok(tx) => Ok(tx?),
            Err(_) => Err(StoreError::Timeout(deadline)),
        }
    }

    /// Commit `tx` if the work succeeded, otherwise roll it back.
    /// Commit runs after the deadline so a `Timeout` never leaves effects behind.
    async fn finish<T>(
        tx: sqlx::Transaction<'static, Sqlite>,
        applied: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match applied {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    // ========================
    // Account operations
    // ========================

    /// Insert an account in its own unit of work, bounded by `deadline`.
    async fn insert_account(
        &self,
        id: AccountId,
        initial_balance: Amount,
        deadline: Duration,
    ) -> Result<Account, StoreError> {
        if initial_balance < Decimal::ZERO {
            return Err(StoreError::NegativeBalance(initial_balance));
        }

        let expires = Instant::now() + deadline;
        let mut tx = self.begin_by(expires, deadline).await?;

        let account = Account::new(id, initial_balance);
        let applied = time::timeout_at(expires, Self::write_account(&mut *tx, &account))
            .await
            .unwrap_or(Err(StoreError::Timeout(deadline)));

        match Self::finish(tx, applied).await {
            Ok(()) => {
                info!(account_id = id, balance = %initial_balance, "Account created");
                Ok(account)
            }
            Err(err) => {
                debug!(account_id = id, error = %err, "Account not created");
                Err(err)
            }
        }
    }

    async fn write_account(
        conn: &mut SqliteConnection,
        account: &Account,
    ) -> Result<(), StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (id, balance, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(account.id)
        .bind(account.balance.to_string())
        .bind(account.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AccountAlreadyExists(account.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_account(&self, id: AccountId) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, balance, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_account(&row),
            None => Err(StoreError::AccountNotFound(id)),
        }
    }

    async fn fetch_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query("SELECT id, balance, created_at FROM accounts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_account).collect()
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account, StoreError> {
        let balance: String = row.try_get("balance")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Account {
            id: row.try_get("id")?,
            balance: parse_stored_amount("balance", balance)?,
            created_at: parse_stored_timestamp("created_at", created_at)?,
        })
    }

    // ========================
    // Transfer operations
    // ========================

    /// Transfer with an explicit deadline instead of the configured one.
    ///
    /// The deadline bounds connection checkout, lock acquisition, validation
    /// and the writes. Commit runs after it, so `StoreError::Timeout` always
    /// means the unit of work was rolled back and nothing changed.
    #[tracing::instrument(level = "debug", skip(self, amount), fields(amount = %amount))]
    pub async fn transfer_within(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Amount,
        deadline: Duration,
    ) -> Result<Transaction, StoreError> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::NonPositiveAmount(amount));
        }
        if source == destination {
            return Err(StoreError::SameAccount(source));
        }

        let expires = Instant::now() + deadline;
        let mut tx = self.begin_by(expires, deadline).await?;

        let applied = time::timeout_at(
            expires,
            Self::apply_transfer(&mut *tx, source, destination, amount),
        )
        .await
        .unwrap_or(Err(StoreError::Timeout(deadline)));

        match Self::finish(tx, applied).await {
            Ok(record) => {
                info!(
                    transaction_id = record.id,
                    source,
                    destination,
                    amount = %amount,
                    "Transfer committed"
                );
                Ok(record)
            }
            Err(err) => {
                if err.is_storage_failure() {
                    warn!(source, destination, error = %err, "Transfer rolled back");
                } else {
                    debug!(source, destination, error = %err, "Transfer rejected");
                }
                Err(err)
            }
        }
    }

    /// Lock both rows (source first), validate funds, write both balances
    /// and append the ledger entry. Caller commits or rolls back.
    async fn apply_transfer(
        conn: &mut SqliteConnection,
        source: AccountId,
        destination: AccountId,
        amount: Amount,
    ) -> Result<Transaction, StoreError> {
        let source_balance = Self::lock_balance(conn, source).await?;
        let destination_balance = Self::lock_balance(conn, destination).await?;
        debug!(source, destination, "Account rows locked");

        if source_balance < amount {
            return Err(StoreError::InsufficientFunds {
                account_id: source,
                balance: source_balance,
                required: amount,
            });
        }

        let new_source = exact_sub(source_balance, amount)
            .ok_or(StoreError::BalanceOverflow(source))?;
        let new_destination = exact_add(destination_balance, amount)
            .ok_or(StoreError::BalanceOverflow(destination))?;

        Self::write_balance(conn, source, new_source).await?;
        Self::write_balance(conn, destination, new_destination).await?;

        let recorded_at = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO transactions
                (source_account_id, destination_account_id, amount, recorded_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(source)
        .bind(destination)
        .bind(amount.to_string())
        .bind(recorded_at.to_rfc3339())
        .fetch_one(&mut *conn)
        .await?;

        Ok(Transaction {
            id,
            source_account_id: source,
            destination_account_id: destination,
            amount,
            recorded_at,
        })
    }

    /// Read a balance while taking the write lock on its row.
    /// SQLite has no `SELECT ... FOR UPDATE`; a no-op update returning the
    /// row does the same job.
    async fn lock_balance(
        conn: &mut SqliteConnection,
        id: AccountId,
    ) -> Result<Amount, StoreError> {
        let stored: Option<String> = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance WHERE id = ? RETURNING balance",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let stored = stored.ok_or(StoreError::AccountNotFound(id))?;
        parse_stored_amount("balance", stored)
    }

    async fn write_balance(
        conn: &mut SqliteConnection,
        id: AccountId,
        balance: Amount,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = ? WHERE id = ?")
            .bind(balance.to_string())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() != 1 {
            return Err(StoreError::AccountNotFound(id));
        }
        Ok(())
    }

    async fn fetch_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_account_id, destination_account_id, amount, recorded_at
            FROM transactions
            WHERE source_account_id = ? OR destination_account_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(account_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction, StoreError> {
        let amount: String = row.try_get("amount")?;
        let recorded_at: String = row.try_get("recorded_at")?;

        Ok(Transaction {
            id: row.try_get("id")?,
            source_account_id: row.try_get("source_account_id")?,
            destination_account_id: row.try_get("destination_account_id")?,
            amount: parse_stored_amount("amount", amount)?,
            recorded_at: parse_stored_timestamp("recorded_at", recorded_at)?,
        })
    }

    // ========================
    // Integrity operations
    // ========================

    async fn collect_integrity_stats(&self) -> Result<IntegrityStats, StoreError> {
        let amounts: Vec<String> = sqlx::query_scalar("SELECT amount FROM transactions")
            .fetch_all(&self.pool)
            .await?;

        let mut non_positive_transactions = 0;
        for amount in &amounts {
            if parse_stored_amount("amount", amount.clone())? <= Decimal::ZERO {
                non_positive_transactions += 1;
            }
        }

        let dangling_transactions: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM transactions t
            WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = t.source_account_id)
               OR NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = t.destination_account_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(IntegrityStats {
            transaction_count: amounts.len() as i64,
            dangling_transactions,
            non_positive_transactions,
        })
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn create_account(
        &self,
        id: AccountId,
        initial_balance: Amount,
    ) -> Result<Account, StoreError> {
        self.insert_account(id, initial_balance, self.config.operation_timeout)
            .await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.bounded(self.fetch_account(id)).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.bounded(self.fetch_accounts()).await
    }

    async fn list_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.bounded(self.fetch_transactions(account_id)).await
    }

    async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Amount,
    ) -> Result<Transaction, StoreError> {
        self.transfer_within(source, destination, amount, self.config.operation_timeout)
            .await
    }

    async fn integrity_stats(&self) -> Result<IntegrityStats, StoreError> {
        self.bounded(self.collect_integrity_stats()).await
    }
}

fn parse_stored_amount(column: &'static str, value: String) -> Result<Amount, StoreError> {
    match Decimal::from_str_exact(&value) {
        Ok(amount) => Ok(amount),
        Err(_) => Err(StoreError::CorruptValue { column, value }),
    }
}

fn parse_stored_timestamp(
    column: &'static str,
    value: String,
) -> Result<DateTime<Utc>, StoreError> {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => Err(StoreError::CorruptValue { column, value }),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    use super::*;

    async fn test_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path().join("test.db"), StoreConfig::default())
            .await
            .unwrap();
        (repo, temp_dir)
    }

    #[tokio::test]
    async fn test_connect_requires_existing_database() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.db");
        assert!(
            Repository::connect(&missing, StoreConfig::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (repo, _temp) = test_repo().await;
        repo.migrate().await.unwrap();
        repo.create_account(1, dec!(1)).await.unwrap();
        repo.migrate().await.unwrap();
        assert_eq!(repo.list_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_balance_text_keeps_scale() {
        let (repo, _temp) = test_repo().await;
        repo.create_account(1, dec!(100.00)).await.unwrap();
        repo.create_account(2, dec!(0.00)).await.unwrap();
        repo.transfer(1, 2, dec!(30.00)).await.unwrap();

        let stored: String = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = 1")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(stored, "70.00");
    }

    #[tokio::test]
    async fn test_duplicate_id_maps_to_already_exists() {
        let (repo, _temp) = test_repo().await;
        repo.create_account(5, dec!(10)).await.unwrap();

        let err = repo.create_account(5, dec!(20)).await.unwrap_err();
        assert!(matches!(err, StoreError::AccountAlreadyExists(5)));
        assert_eq!(repo.get_account(5).await.unwrap().balance, dec!(10));
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_inputs() {
        let (repo, _temp) = test_repo().await;
        repo.create_account(1, dec!(10)).await.unwrap();

        assert!(matches!(
            repo.create_account(2, dec!(-1)).await,
            Err(StoreError::NegativeBalance(_))
        ));
        assert!(matches!(
            repo.transfer(1, 1, dec!(1)).await,
            Err(StoreError::SameAccount(1))
        ));
        assert!(matches!(
            repo.transfer(1, 2, dec!(0)).await,
            Err(StoreError::NonPositiveAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_balance_is_a_storage_failure() {
        let (repo, _temp) = test_repo().await;
        repo.create_account(1, dec!(10)).await.unwrap();
        repo.create_account(2, dec!(10)).await.unwrap();
        sqlx::query("UPDATE accounts SET balance = 'ten' WHERE id = 1")
            .execute(&repo.pool)
            .await
            .unwrap();

        let err = repo.transfer(1, 2, dec!(1)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::CorruptValue {
                column: "balance",
                ..
            }
        ));
        assert!(err.is_storage_failure());
        assert_eq!(repo.get_account(2).await.unwrap().balance, dec!(10));
    }

    #[tokio::test]
    async fn test_destination_overflow_rolls_back() {
        let (repo, _temp) = test_repo().await;
        repo.create_account(1, dec!(10)).await.unwrap();
        repo.create_account(2, Decimal::MAX).await.unwrap();

        let err = repo.transfer(1, 2, dec!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::BalanceOverflow(2)));
        assert_eq!(repo.get_account(1).await.unwrap().balance, dec!(10));
        assert!(repo.list_transactions(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_wait_past_deadline_times_out_and_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig {
            busy_timeout: Duration::from_secs(1),
            ..StoreConfig::default()
        };
        let repo = Repository::init(temp_dir.path().join("test.db"), config)
            .await
            .unwrap();
        repo.create_account(1, dec!(50)).await.unwrap();
        repo.create_account(2, dec!(0)).await.unwrap();

        // Hold the write lock from another connection.
        let mut holder = repo.pool.begin().await.unwrap();
        sqlx::query("UPDATE accounts SET balance = balance WHERE id = 1")
            .execute(&mut *holder)
            .await
            .unwrap();

        let err = repo
            .transfer_within(1, 2, dec!(10), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(err.is_retryable());

        holder.rollback().await.unwrap();

        assert_eq!(repo.get_account(1).await.unwrap().balance, dec!(50));
        assert_eq!(repo.get_account(2).await.unwrap().balance, dec!(0));
        assert!(repo.list_transactions(1).await.unwrap().is_empty());

        // The same transfer succeeds once the lock is released.
        repo.transfer(1, 2, dec!(10)).await.unwrap();
        assert_eq!(repo.get_account(2).await.unwrap().balance, dec!(10));
    }

    #[tokio::test]
    async fn test_credit_that_would_round_rolls_back() {
        let (repo, _temp) = test_repo().await;
        // 29 significant digits, the widest mantissa a Decimal holds.
        let wide = Decimal::from_i128_with_scale(79228162514264337593543950335, 1);
        repo.create_account(1, wide).await.unwrap();
        repo.create_account(2, dec!(1.00)).await.unwrap();

        let err = repo.transfer(2, 1, dec!(0.01)).await.unwrap_err();
        assert!(matches!(err, StoreError::BalanceOverflow(1)));

        assert_eq!(repo.get_account(1).await.unwrap().balance, wide);
        assert_eq!(repo.get_account(2).await.unwrap().balance, dec!(1.00));
        assert!(repo.list_transactions(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_past_deadline_leaves_no_account() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig {
            busy_timeout: Duration::from_secs(1),
            operation_timeout: Duration::from_millis(200),
            ..StoreConfig::default()
        };
        let repo = Repository::init(temp_dir.path().join("test.db"), config)
            .await
            .unwrap();
        repo.create_account(1, dec!(1)).await.unwrap();

        let mut holder = repo.pool.begin().await.unwrap();
        sqlx::query("UPDATE accounts SET balance = balance WHERE id = 1")
            .execute(&mut *holder)
            .await
            .unwrap();

        let err = repo.create_account(9, dec!(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(err.is_retryable());

        holder.commit().await.unwrap();

        assert!(matches!(
            repo.get_account(9).await,
            Err(StoreError::AccountNotFound(9))
        ));
        // Retrying after the timeout creates the account exactly once.
        repo.create_account(9, dec!(5)).await.unwrap();
        assert_eq!(repo.get_account(9).await.unwrap().balance, dec!(5));
    }

    #[tokio::test]
    async fn test_connection_wait_counts_against_deadline() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::default().with_max_connections(1);
        let repo = Repository::init(temp_dir.path().join("test.db"), config)
            .await
            .unwrap();
        repo.create_account(1, dec!(10)).await.unwrap();
        repo.create_account(2, dec!(0)).await.unwrap();

        let held = repo.pool.acquire().await.unwrap();
        let started = Instant::now();
        let err = repo
            .transfer_within(1, 2, dec!(1), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(started.elapsed() < repo.config.acquire_timeout);
        drop(held);

        repo.transfer(1, 2, dec!(1)).await.unwrap();
        assert_eq!(repo.get_account(2).await.unwrap().balance, dec!(1));
    }

    #[tokio::test]
    async fn test_integrity_stats() {
        let (repo, _temp) = test_repo().await;
        repo.create_account(1, dec!(10)).await.unwrap();
        repo.create_account(2, dec!(0)).await.unwrap();
        repo.transfer(1, 2, dec!(4)).await.unwrap();
        repo.transfer(2, 1, dec!(1)).await.unwrap();

        let stats = repo.integrity_stats().await.unwrap();
        assert_eq!(stats.transaction_count, 2);
        assert_eq!(stats.dangling_transactions, 0);
        assert_eq!(stats.non_positive_transactions, 0);
    }
}
