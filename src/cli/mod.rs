use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::application::LedgerService;
use crate::domain::{Account, AccountId, Transaction};
use crate::storage::StoreConfig;

/// Balancebook - account ledger with atomic transfers
#[derive(Parser)]
#[command(name = "balancebook")]
#[command(about = "An account ledger whose transfers never create, lose or overdraw money")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(
        short,
        long,
        env = "BALANCEBOOK_DATABASE",
        default_value = "balancebook.db"
    )]
    pub database: PathBuf,

    /// Maximum number of pooled database connections
    #[arg(long, env = "BALANCEBOOK_MAX_CONNECTIONS", default_value_t = 8)]
    pub max_connections: u32,

    /// Deadline for each ledger operation, in milliseconds
    #[arg(
        long,
        env = "BALANCEBOOK_TIMEOUT_MS",
        default_value_t = 3000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_ms: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Move money between two accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account ID
        #[arg(long)]
        from: AccountId,

        /// Destination account ID
        #[arg(long)]
        to: AccountId,
    },

    /// List transactions for an account, most recent first
    Transactions {
        /// Account ID
        account_id: AccountId,
    },

    /// Verify ledger integrity
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Create {
        /// Account ID (must be unique)
        id: AccountId,

        /// Opening balance (e.g., "100.00")
        initial_balance: String,
    },

    /// Show an account and its balance
    Show {
        /// Account ID
        id: AccountId,
    },

    /// List all accounts
    List,
}

impl Cli {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_max_connections(self.max_connections)
            .with_operation_timeout(Duration::from_millis(self.timeout_ms))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.store_config();

        let service = match self.command {
            Commands::Init => {
                let service = LedgerService::init(&self.database, config).await?;
                println!("Database initialized: {}", self.database.display());
                service
            }

            Commands::Account(account_cmd) => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_account_command(&service, account_cmd, self.json).await?;
                service
            }

            Commands::Transfer { amount, from, to } => {
                let service = LedgerService::connect(&self.database, config).await?;
                let tx = service.transfer(from, to, &amount).await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&tx)?);
                } else {
                    println!(
                        "Transferred {} from {} to {} (transaction {})",
                        tx.amount, tx.source_account_id, tx.destination_account_id, tx.id
                    );
                }
                service
            }

            Commands::Transactions { account_id } => {
                let service = LedgerService::connect(&self.database, config).await?;
                let transactions = service.list_transactions(account_id).await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&transactions)?);
                } else {
                    print_transactions(&transactions);
                }
                service
            }

            Commands::Check => {
                let service = LedgerService::connect(&self.database, config).await?;
                let report = service.check_integrity().await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("Ledger integrity check");
                    println!("  Accounts:           {}", report.account_count);
                    println!("  Transactions:       {}", report.transaction_count);
                    match report.total_balance {
                        Some(total) => println!("  Total balance:      {}", total),
                        None => println!("  Total balance:      overflow"),
                    }
                    println!("  Negative balances:  {}", report.negative_accounts.len());
                    println!("  Dangling entries:   {}", report.dangling_transactions);
                    println!("  Non-positive:       {}", report.non_positive_transactions);
                    println!();
                    if report.is_healthy() {
                        println!("OK");
                    } else {
                        println!("PROBLEMS FOUND");
                    }
                }
                service
            }
        };

        service.close().await;
        Ok(())
    }
}

async fn run_account_command(
    service: &LedgerService,
    cmd: AccountCommands,
    json: bool,
) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            id,
            initial_balance,
        } => {
            let account = service.create_account(id, &initial_balance).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                println!("Created account: {} (balance {})", account.id, account.balance);
            }
        }

        AccountCommands::Show { id } => {
            let account = service.get_account(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                println!("Account: {}", account.id);
                println!("  Balance:  {}", account.balance);
                println!(
                    "  Created:  {}",
                    account.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else {
                print_accounts(&accounts);
            }
        }
    }

    Ok(())
}

fn print_accounts(accounts: &[Account]) {
    if accounts.is_empty() {
        println!("No accounts found.");
        return;
    }

    println!("{:<20} {:>20}", "ACCOUNT", "BALANCE");
    println!("{}", "-".repeat(41));
    for account in accounts {
        println!("{:<20} {:>20}", account.id, account.balance.to_string());
    }
}

fn print_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions found.");
        return;
    }

    println!(
        "{:<10} {:<20} {:>12} {:>12} {:>16}",
        "ID", "DATE", "FROM", "TO", "AMOUNT"
    );
    println!("{}", "-".repeat(74));
    for tx in transactions {
        println!(
            "{:<10} {:<20} {:>12} {:>12} {:>16}",
            tx.id,
            tx.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            tx.source_account_id,
            tx.destination_account_id,
            tx.amount.to_string()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transfer_command() {
        let cli = Cli::try_parse_from([
            "balancebook",
            "--database",
            "ledger.db",
            "transfer",
            "30.00",
            "--from",
            "1",
            "--to",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.database, PathBuf::from("ledger.db"));
        match cli.command {
            Commands::Transfer { amount, from, to } => {
                assert_eq!(amount, "30.00");
                assert_eq!(from, 1);
                assert_eq!(to, 2);
            }
            _ => panic!("expected transfer command"),
        }
    }

    #[test]
    fn test_store_config_from_flags() {
        let cli = Cli::try_parse_from([
            "balancebook",
            "--max-connections",
            "4",
            "--timeout-ms",
            "1500",
            "check",
        ])
        .unwrap();

        let config = cli.store_config();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.operation_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(Cli::try_parse_from(["balancebook", "--timeout-ms", "0", "check"]).is_err());
        assert!(Cli::try_parse_from(["balancebook", "--timeout-ms", "1", "check"]).is_ok());
    }

    #[test]
    fn test_account_id_must_be_integer() {
        assert!(Cli::try_parse_from(["balancebook", "account", "show", "abc"]).is_err());
    }
}
