use super::{AccountGuard, AccountLocks};
use crate::domain::account::{AccountOwner, WalletAccount};
use crate::domain::entry::{EntryFilter, LedgerEntry, Pagination, select_page};
use crate::domain::ports::{AccountStore, EntryStore, LedgerStore, LedgerUnitOfWork};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, WalletAccount>,
    owners: HashMap<AccountOwner, Uuid>,
    /// Per-account entries in commit order.
    entries: HashMap<Uuid, Vec<LedgerEntry>>,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    locks: AccountLocks,
}

/// A thread-safe in-memory store for wallet accounts and their ledgers.
///
/// Uses `Arc<RwLock<..>>` tables shared by every clone. Writes through a
/// [`LedgerUnitOfWork`] are staged and applied under a single write lock, so
/// readers never observe half a commit.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryLedgerStore {
    async fn get(&self, id: Uuid) -> Result<Option<WalletAccount>> {
        let tables = self.shared.tables.read().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn find_or_create(
        &self,
        owner: AccountOwner,
        candidate: WalletAccount,
    ) -> Result<(WalletAccount, bool)> {
        let mut tables = self.shared.tables.write().await;
        if let Some(id) = tables.owners.get(&owner).copied()
            && let Some(existing) = tables.accounts.get(&id)
        {
            return Ok((existing.clone(), false));
        }

        tables.owners.insert(owner, candidate.id);
        tables.accounts.insert(candidate.id, candidate.clone());
        Ok((candidate, true))
    }

    async fn get_all(&self) -> Result<Vec<WalletAccount>> {
        let tables = self.shared.tables.read().await;
        let mut accounts: Vec<_> = tables.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| (a.user_id, a.profile_id, a.created_at));
        Ok(accounts)
    }
}

#[async_trait]
impl EntryStore for InMemoryLedgerStore {
    async fn list_for_account(
        &self,
        account_id: Uuid,
        filter: &EntryFilter,
        page: Pagination,
    ) -> Result<Vec<LedgerEntry>> {
        let entries = self.all_for_account(account_id).await?;
        Ok(select_page(entries, filter, page))
    }

    async fn all_for_account(&self, account_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let tables = self.shared.tables.read().await;
        Ok(tables.entries.get(&account_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_account_for_update(&self, id: Uuid) -> Result<Box<dyn LedgerUnitOfWork>> {
        let guard = self.shared.locks.acquire(id).await;
        let account = self
            .get(id)
            .await?
            .ok_or(LedgerError::NotFound { account_id: id })?;

        Ok(Box::new(InMemoryUnitOfWork {
            shared: self.shared.clone(),
            account,
            staged_account: None,
            staged_entries: Vec::new(),
            _guard: guard,
        }))
    }
}

struct InMemoryUnitOfWork {
    shared: Arc<Shared>,
    account: WalletAccount,
    staged_account: Option<WalletAccount>,
    staged_entries: Vec<LedgerEntry>,
    _guard: AccountGuard,
}

#[async_trait]
impl LedgerUnitOfWork for InMemoryUnitOfWork {
    fn account(&self) -> &WalletAccount {
        &self.account
    }

    fn insert_entry(&mut self, entry: LedgerEntry) {
        self.staged_entries.push(entry);
    }

    fn update_account(&mut self, account: WalletAccount) {
        self.staged_account = Some(account);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        if let Some(entry) = this
            .staged_entries
            .iter()
            .find(|e| e.wallet_account_id != this.account.id)
        {
            return Err(LedgerError::Storage(format!(
                "entry {} does not belong to account {}",
                entry.id, this.account.id
            )));
        }

        let mut tables = this.shared.tables.write().await;
        if let Some(account) = this.staged_account {
            tables.accounts.insert(account.id, account);
        }
        tables
            .entries
            .entry(this.account.id)
            .or_default()
            .extend(this.staged_entries);
        Ok(())
    }
}
