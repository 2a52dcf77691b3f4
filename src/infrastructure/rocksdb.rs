use super::{AccountGuard, AccountLocks};
use crate::domain::account::{AccountOwner, AccountType, WalletAccount};
use crate::domain::entry::{EntryFilter, LedgerEntry, Pagination, select_page};
use crate::domain::ports::{AccountStore, EntryStore, LedgerStore, LedgerUnitOfWork};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for storing wallet accounts, keyed by account id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family mapping an owner tuple to its account id.
pub const CF_OWNERS: &str = "owners";
/// Column Family for ledger entries, keyed by account id then big-endian sequence.
pub const CF_ENTRIES: &str = "entries";

/// A persistent store implementation using RocksDB.
///
/// Accounts, the owner index and ledger entries live in separate Column
/// Families. A commit writes the account and its new entries in one
/// `WriteBatch`, so either all of it lands or none of it does.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
/// Account locks are process-local; RocksDB's own file lock keeps a second
/// process from opening the same database.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    locks: Arc<AccountLocks>,
    create_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_ACCOUNTS, CF_OWNERS, CF_ENTRIES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            locks: Arc::new(AccountLocks::new()),
            create_lock: Arc::new(Mutex::new(())),
        })
    }

    fn read_account(&self, id: Uuid) -> Result<Option<WalletAccount>> {
        let cf = cf(&self.db, CF_ACCOUNTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_entries(&self, account_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let cf = cf(&self.db, CF_ENTRIES)?;
        let prefix = account_id.as_bytes();
        let mut entries = Vec::new();

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }
}

fn cf<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| LedgerError::Storage(format!("{name} column family not found")))
}

fn owner_key(owner: &AccountOwner) -> Vec<u8> {
    let kind: u8 = match owner.account_type {
        AccountType::User => 0,
        AccountType::Freelancer => 1,
        AccountType::Company => 2,
        AccountType::Agency => 3,
    };
    let mut key = Vec::with_capacity(17);
    key.extend_from_slice(&owner.user_id.to_be_bytes());
    key.extend_from_slice(&owner.profile_id.to_be_bytes());
    key.push(kind);
    key
}

fn entry_key(entry: &LedgerEntry) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(entry.wallet_account_id.as_bytes());
    key.extend_from_slice(&entry.sequence.to_be_bytes());
    key
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn get(&self, id: Uuid) -> Result<Option<WalletAccount>> {
        self.read_account(id)
    }

    async fn find_or_create(
        &self,
        owner: AccountOwner,
        candidate: WalletAccount,
    ) -> Result<(WalletAccount, bool)> {
        let _guard = self.create_lock.lock().await;
        let owners = cf(&self.db, CF_OWNERS)?;
        let key = owner_key(&owner);

        if let Some(raw_id) = self.db.get_cf(owners, &key)? {
            let id = Uuid::from_slice(&raw_id)
                .map_err(|e| LedgerError::Storage(format!("corrupt owner index: {e}")))?;
            if let Some(existing) = self.read_account(id)? {
                return Ok((existing, false));
            }
        }

        let accounts = cf(&self.db, CF_ACCOUNTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(accounts, candidate.id.as_bytes(), serde_json::to_vec(&candidate)?);
        batch.put_cf(owners, &key, candidate.id.as_bytes());
        self.db.write(batch)?;

        Ok((candidate, true))
    }

    async fn get_all(&self) -> Result<Vec<WalletAccount>> {
        let handle = cf(&self.db, CF_ACCOUNTS)?;

        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item?;
            let account: WalletAccount = serde_json::from_slice(&value)?;
            accounts.push(account);
        }
        accounts.sort_by_key(|a| (a.user_id, a.profile_id, a.created_at));

        Ok(accounts)
    }
}

#[async_trait]
impl EntryStore for RocksDBStore {
    async fn list_for_account(
        &self,
        account_id: Uuid,
        filter: &EntryFilter,
        page: Pagination,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(select_page(self.read_entries(account_id)?, filter, page))
    }

    async fn all_for_account(&self, account_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.read_entries(account_id)
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn find_account_for_update(&self, id: Uuid) -> Result<Box<dyn LedgerUnitOfWork>> {
        let guard = self.locks.acquire(id).await;
        let account = self
            .read_account(id)?
            .ok_or(LedgerError::NotFound { account_id: id })?;

        Ok(Box::new(RocksDBUnitOfWork {
            db: self.db.clone(),
            account,
            staged_account: None,
            staged_entries: Vec::new(),
            _guard: guard,
        }))
    }
}

struct RocksDBUnitOfWork {
    db: Arc<DB>,
    account: WalletAccount,
    staged_account: Option<WalletAccount>,
    staged_entries: Vec<LedgerEntry>,
    _guard: AccountGuard,
}

#[async_trait]
impl LedgerUnitOfWork for RocksDBUnitOfWork {
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
        let accounts = cf(&self.db, CF_ACCOUNTS)?;
        let entries = cf(&self.db, CF_ENTRIES)?;

        let mut batch = WriteBatch::default();
        for entry in &self.staged_entries {
            if entry.wallet_account_id != self.account.id {
                return Err(LedgerError::Storage(format!(
                    "entry {} does not belong to account {}",
                    entry.id, self.account.id
                )));
            }
            batch.put_cf(entries, entry_key(entry), serde_json::to_vec(entry)?);
        }
        if let Some(account) = &self.staged_account {
            batch.put_cf(accounts, account.id.as_bytes(), serde_json::to_vec(account)?);
        }

        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::{LedgerEngine, NewWalletAccount};
    use crate::domain::account::Balance;
    use crate::domain::entry::LedgerEntryRequest;
    use crate::health::{HealthGate, HealthRegistry, LEDGER_DEPENDENCIES};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn owner(user_id: u64) -> AccountOwner {
        AccountOwner {
            user_id,
            profile_id: 3,
            account_type: AccountType::Agency,
        }
    }

    fn engine(store: RocksDBStore) -> LedgerEngine {
        LedgerEngine::new(
            Box::new(store),
            HealthGate::new(HealthRegistry::with_dependencies(LEDGER_DEPENDENCIES)),
        )
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_ACCOUNTS).is_some());
        assert!(store.db.cf_handle(CF_OWNERS).is_some());
        assert!(store.db.cf_handle(CF_ENTRIES).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_find_or_create() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let candidate = WalletAccount::new(owner(1), "USD".to_string(), Utc::now());
        let (account, created) = store.find_or_create(owner(1), candidate).await.unwrap();
        assert!(created);

        let again = WalletAccount::new(owner(1), "USD".to_string(), Utc::now());
        let (found, created) = store.find_or_create(owner(1), again).await.unwrap();
        assert!(!created);
        assert_eq!(found, account);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_entries_survive_reopen() {
        let dir = tempdir().unwrap();

        let id = {
            let engine = engine(RocksDBStore::open(dir.path()).unwrap());
            let (account, _) = engine
                .open_account(NewWalletAccount::for_owner(owner(1)))
                .await
                .unwrap();
            engine
                .record_ledger_entry(account.id, LedgerEntryRequest::new("credit", dec!(70)))
                .await
                .unwrap();
            engine
                .record_ledger_entry(account.id, LedgerEntryRequest::new("hold", dec!(20)))
                .await
                .unwrap();
            account.id
        };

        let engine = engine(RocksDBStore::open(dir.path()).unwrap());
        let account = engine.get_account(id).await.unwrap();
        assert_eq!(account.available_balance, Balance::new(dec!(50)));
        assert_eq!(account.pending_hold_balance, Balance::new(dec!(20)));
        assert!(engine.reconcile(id).await.unwrap().is_balanced());
    }

    #[tokio::test]
    async fn test_rocksdb_entries_are_scoped_per_account() {
        let dir = tempdir().unwrap();
        let engine = engine(RocksDBStore::open(dir.path()).unwrap());

        let mut ids = Vec::new();
        for user in 1..=3 {
            let (account, _) = engine
                .open_account(NewWalletAccount::for_owner(owner(user)))
                .await
                .unwrap();
            for _ in 0..user {
                engine
                    .record_ledger_entry(account.id, LedgerEntryRequest::new("credit", dec!(1)))
                    .await
                    .unwrap();
            }
            ids.push(account.id);
        }

        for (index, id) in ids.into_iter().enumerate() {
            let report = engine.reconcile(id).await.unwrap();
            assert!(report.is_balanced());
            assert_eq!(report.entries_replayed, index + 1);
        }
    }
}
