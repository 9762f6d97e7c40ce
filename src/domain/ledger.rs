use serde::Serialize;

use super::{Account, AccountId, Amount, Transaction, checked_total};

/// Result of an integrity check over the whole ledger.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: i64,
    /// Sum of all balances. `None` if the sum overflows.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub total_balance: Option<Amount>,
    /// Accounts whose balance is below zero.
    pub negative_accounts: Vec<AccountId>,
    /// Ledger entries referencing an account that does not exist.
    pub dangling_transactions: i64,
    /// Ledger entries whose amount is zero or negative.
    pub non_positive_transactions: i64,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.total_balance.is_some()
            && self.negative_accounts.is_empty()
            && self.dangling_transactions == 0
            && self.non_positive_transactions == 0
    }
}

/// Build an integrity report from the current accounts and ledger statistics.
pub fn build_integrity_report(
    accounts: &[Account],
    transaction_count: i64,
    dangling_transactions: i64,
    non_positive_transactions: i64,
) -> IntegrityReport {
    let negative_accounts = accounts
        .iter()
        .filter(|account| account.balance < Amount::ZERO)
        .map(|account| account.id)
        .collect();

    IntegrityReport {
        account_count: accounts.len(),
        transaction_count,
        total_balance: checked_total(accounts.iter().map(|account| account.balance)),
        negative_accounts,
        dangling_transactions,
        non_positive_transactions,
    }
}

/// Replay ledger entries against opening balances.
/// Returns the balance `account_id` should hold given `opening` and `entries`.
pub fn replay_balance(account_id: AccountId, opening: Amount, entries: &[Transaction]) -> Amount {
    entries
        .iter()
        .fold(opening, |balance, entry| balance + entry.effect_on(account_id))
}
