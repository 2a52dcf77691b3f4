use super::account::{AccountOwner, WalletAccount};
use super::entry::{EntryFilter, LedgerEntry, Pagination};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<WalletAccount>>;

    /// Returns the account owned by `owner`, inserting `candidate` if there is
    /// none. The flag is `true` when `candidate` was inserted.
    async fn find_or_create(
        &self,
        owner: AccountOwner,
        candidate: WalletAccount,
    ) -> Result<(WalletAccount, bool)>;

    async fn get_all(&self) -> Result<Vec<WalletAccount>>;
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Entries in display order (`occurred_at`, then sequence), filtered and paged.
    async fn list_for_account(
        &self,
        account_id: Uuid,
        filter: &EntryFilter,
        page: Pagination,
    ) -> Result<Vec<LedgerEntry>>;

    /// Every entry of the account in commit order.
    async fn all_for_account(&self, account_id: Uuid) -> Result<Vec<LedgerEntry>>;
}

/// Store that can hand out an exclusive, transactional view of one account.
#[async_trait]
pub trait LedgerStore: AccountStore + EntryStore {
    /// Locks the account and loads it. The lock is held by the returned unit
    /// of work until it is committed or dropped.
    async fn find_account_for_update(&self, id: Uuid) -> Result<Box<dyn LedgerUnitOfWork>>;
}

/// Staged writes against one locked account.
///
/// Nothing is visible to other readers until [`commit`](Self::commit).
/// Dropping without committing discards every staged write.
#[async_trait]
pub trait LedgerUnitOfWork: Send {
    fn account(&self) -> &WalletAccount;

    fn insert_entry(&mut self, entry: LedgerEntry);

    fn update_account(&mut self, account: WalletAccount);

    async fn commit(self: Box<Self>) -> Result<()>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait ReferenceGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// `wl_` followed by a simple-formatted v4 UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidReferenceGenerator;

impl ReferenceGenerator for UuidReferenceGenerator {
    fn generate(&self) -> String {
        format!("wl_{}", Uuid::new_v4().simple())
    }
}
