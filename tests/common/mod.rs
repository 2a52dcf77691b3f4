#![allow(dead_code)]

use std::fs::File;
use std::io::Error;
use std::path::Path;
use uuid::Uuid;
use wallet_ledger::application::engine::{LedgerEngine, NewWalletAccount};
use wallet_ledger::domain::account::{AccountOwner, AccountType};
use wallet_ledger::health::{HealthGate, HealthRegistry, LEDGER_DEPENDENCIES};
use wallet_ledger::infrastructure::in_memory::InMemoryLedgerStore;

pub const HEADER: [&str; 5] = ["type", "user", "profile", "account", "amount"];

pub fn engine_with_registry() -> (LedgerEngine, HealthRegistry) {
    let registry = HealthRegistry::with_dependencies(LEDGER_DEPENDENCIES);
    let engine = LedgerEngine::new(
        Box::new(InMemoryLedgerStore::new()),
        HealthGate::new(registry.clone()),
    );
    (engine, registry)
}

pub fn owner(user_id: u64) -> AccountOwner {
    AccountOwner {
        user_id,
        profile_id: 1,
        account_type: AccountType::User,
    }
}

pub async fn open_account(engine: &LedgerEngine, user_id: u64) -> Uuid {
    let (account, _) = engine
        .open_account(NewWalletAccount::for_owner(owner(user_id)))
        .await
        .unwrap();
    account.id
}

/// Writes `rows` credits of 1.0 for user 1.
pub fn generate_csv(path: &Path, rows: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(HEADER)?;
    for _ in 1..=rows {
        wtr.write_record(["credit", "1", "1", "user", "1.0"])?;
    }

    wtr.flush()?;
    Ok(())
}
