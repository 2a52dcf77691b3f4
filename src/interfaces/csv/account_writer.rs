use crate::domain::account::{AccountStatus, AccountType, WalletAccount};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    account_id: String,
    user: u64,
    profile: u64,
    account_type: AccountType,
    status: AccountStatus,
    currency: &'a str,
    current: String,
    available: String,
    hold: String,
    entries: u64,
}

impl<'a> From<&'a WalletAccount> for AccountRow<'a> {
    fn from(account: &'a WalletAccount) -> Self {
        Self {
            account_id: account.id.to_string(),
            user: account.user_id,
            profile: account.profile_id,
            account_type: account.account_type,
            status: account.status,
            currency: &account.currency_code,
            current: account.current_balance.to_string(),
            available: account.available_balance.to_string(),
            hold: account.pending_hold_balance.to_string(),
            entries: account.ledger_sequence,
        }
    }
}

/// Writes account balances as CSV, one row per wallet account.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, accounts: Vec<WalletAccount>) -> Result<()> {
        for account in &accounts {
            self.writer.serialize(AccountRow::from(account))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
