// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use balancebook::application::LedgerService;
use balancebook::domain::{Amount, checked_total};
use balancebook::storage::StoreConfig;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with(StoreConfig::default()).await
}

pub async fn test_service_with(config: StoreConfig) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(&db_path, config).await?;
    Ok((service, temp_dir))
}

/// Sum of every account balance in the ledger
pub async fn total_balance(service: &LedgerService) -> Result<Amount> {
    let accounts = service.list_accounts().await?;
    checked_total(accounts.iter().map(|account| account.balance))
        .ok_or_else(|| anyhow::anyhow!("total balance overflowed"))
}

/// Test fixture: the two accounts used by most scenarios
pub struct StandardAccounts;

impl StandardAccounts {
    /// Account 1 with 100.00, account 2 with 0.00
    pub async fn create(service: &LedgerService) -> Result<()> {
        service.create_account(1, "100.00").await?;
        service.create_account(2, "0.00").await?;
        Ok(())
    }

    /// `count` empty accounts numbered from `first`
    pub async fn create_empty(service: &LedgerService, first: i64, count: i64) -> Result<()> {
        for id in first..first + count {
            service.create_account(id, "0.00").await?;
        }
        Ok(())
    }
}
