use crate::domain::account::{
    AccountOwner, AccountStatus, Amount, BalanceSnapshot, CustodyProvider, WalletAccount,
    normalize_currency,
};
use crate::domain::entry::{EntryFilter, EntryType, LedgerEntry, LedgerEntryRequest, Pagination};
use crate::domain::metadata::ComplianceMetadata;
use crate::domain::ports::{
    Clock, LedgerStoreBox, ReferenceGenerator, SystemClock, UuidReferenceGenerator,
};
use crate::error::{LedgerError, Result};
use crate::health::{GateContext, HealthGate, LEDGER_DEPENDENCIES};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Parameters for [`LedgerEngine::open_account`].
#[derive(Debug, Clone)]
pub struct NewWalletAccount {
    pub owner: AccountOwner,
    pub currency_code: Option<String>,
    pub custody_provider: Option<CustodyProvider>,
    pub provider_account_id: Option<String>,
}

impl NewWalletAccount {
    pub fn for_owner(owner: AccountOwner) -> Self {
        Self {
            owner,
            currency_code: None,
            custody_provider: None,
            provider_account_id: None,
        }
    }
}

/// Administrative edit of an account. Balances are not editable.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub status: Option<AccountStatus>,
    pub custody_provider: Option<CustodyProvider>,
    pub provider_account_id: Option<Option<String>>,
    pub currency_code: Option<String>,
}

/// Outcome of replaying an account's ledger against its stored balances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub account_id: Uuid,
    pub entries_replayed: usize,
    pub stored: BalanceSnapshot,
    pub replayed: BalanceSnapshot,
    pub discrepancies: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// The wallet ledger engine.
///
/// `LedgerEngine` is the only writer of wallet balances. Every mutation goes
/// through [`record_ledger_entry`](Self::record_ledger_entry), which locks the
/// account, checks dependency health, validates the request, applies the
/// balance transition and commits the entry together with the new balances.
pub struct LedgerEngine {
    store: LedgerStoreBox,
    gate: HealthGate,
    clock: Arc<dyn Clock>,
    references: Arc<dyn ReferenceGenerator>,
    default_currency: String,
}

impl LedgerEngine {
    /// Creates a new `LedgerEngine` with the system clock and UUID references.
    ///
    /// # Arguments
    ///
    /// * `store` - The store for accounts and ledger entries.
    /// * `gate` - The dependency health gate checked before every mutation.
    pub fn new(store: LedgerStoreBox, gate: HealthGate) -> Self {
        Self {
            store,
            gate,
            clock: Arc::new(SystemClock),
            references: Arc::new(UuidReferenceGenerator),
            default_currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reference_generator(mut self, references: Arc<dyn ReferenceGenerator>) -> Self {
        self.references = references;
        self
    }

    pub fn with_default_currency(mut self, currency_code: &str) -> Result<Self> {
        self.default_currency = normalize_currency(currency_code)?;
        Ok(self)
    }

    pub fn gate(&self) -> &HealthGate {
        &self.gate
    }

    /// Fails with `ServiceUnavailable` while any ledger dependency is down.
    pub fn ensure_accepting(&self, entry_type: EntryType) -> Result<()> {
        self.gate.assert_healthy(
            &LEDGER_DEPENDENCIES,
            &GateContext::feature(format!("wallet_ledger:{entry_type}")),
        )
    }

    /// Finds the account owned by the given owner tuple or creates it.
    pub async fn open_account(&self, request: NewWalletAccount) -> Result<(WalletAccount, bool)> {
        let currency_code = match non_blank(request.currency_code) {
            Some(code) => normalize_currency(&code)?,
            None => self.default_currency.clone(),
        };

        let mut candidate = WalletAccount::new(request.owner, currency_code, self.clock.now());
        if let Some(provider) = request.custody_provider {
            candidate.custody_provider = provider;
        }
        candidate.provider_account_id = non_blank(request.provider_account_id);

        let (account, created) = self
            .store
            .find_or_create(request.owner, candidate)
            .await?;
        if created {
            tracing::info!(
                account_id = %account.id,
                user_id = account.user_id,
                profile_id = account.profile_id,
                account_type = %account.account_type,
                "wallet account created"
            );
        }
        Ok((account, created))
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<WalletAccount> {
        self.store
            .get(account_id)
            .await?
            .ok_or(LedgerError::NotFound { account_id })
    }

    pub async fn accounts(&self) -> Result<Vec<WalletAccount>> {
        self.store.get_all().await
    }

    /// Applies an administrative edit under the same lock as ledger writes.
    pub async fn update_account(
        &self,
        account_id: Uuid,
        update: AccountUpdate,
    ) -> Result<WalletAccount> {
        let mut uow = self.store.find_account_for_update(account_id).await?;
        let mut account = uow.account().clone();

        if let Some(code) = update.currency_code {
            let code = normalize_currency(&code)?;
            if code != account.currency_code && account.ledger_sequence > 0 {
                return Err(LedgerError::Conflict(format!(
                    "cannot change currency of account {account_id} after {} ledger entries",
                    account.ledger_sequence
                )));
            }
            account.currency_code = code;
        }
        if let Some(status) = update.status {
            account.status = status;
        }
        if let Some(provider) = update.custody_provider {
            account.custody_provider = provider;
        }
        if let Some(provider_account_id) = update.provider_account_id {
            account.provider_account_id = non_blank(provider_account_id);
        }
        account.updated_at = self.clock.now();

        uow.update_account(account.clone());
        uow.commit().await?;
        tracing::info!(account_id = %account_id, "wallet account updated");
        Ok(account)
    }

    /// Records one ledger entry and updates the account balances atomically.
    ///
    /// Errors leave both the account and the ledger untouched.
    #[tracing::instrument(
        name = "record_ledger_entry",
        skip(self, request),
        fields(account_id = %account_id, entry_type = %request.entry_type)
    )]
    pub async fn record_ledger_entry(
        &self,
        account_id: Uuid,
        request: LedgerEntryRequest,
    ) -> Result<LedgerEntry> {
        let mut uow = self.store.find_account_for_update(account_id).await?;

        let entry_type: EntryType = request.entry_type.parse()?;

        self.ensure_accepting(entry_type)?;

        let amount = Amount::new(request.amount)?;
        let metadata = ComplianceMetadata::stamp(request.metadata)
            .inspect_err(|err| tracing::debug!(%err, "compliance metadata rejected"))?;
        let now = self.clock.now();
        let occurred_at = match non_blank(request.occurred_at) {
            Some(raw) => parse_timestamp(&raw)?,
            None => now,
        };
        let reference =
            non_blank(request.reference).unwrap_or_else(|| self.references.generate());

        let mut account = uow.account().clone();
        let currency_code = match non_blank(request.currency_code) {
            Some(code) => normalize_currency(&code)?,
            None => account.currency_code.clone(),
        };

        let balances = account
            .balances()
            .apply(entry_type, amount)
            .inspect_err(|err| tracing::warn!(%err, "ledger entry rejected"))?;
        account.apply_balances(balances, now);

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            wallet_account_id: account.id,
            sequence: account.ledger_sequence,
            entry_type,
            amount,
            currency_code,
            reference,
            external_reference: non_blank(request.external_reference),
            description: non_blank(request.description),
            initiated_by_id: request.initiated_by_id,
            occurred_at,
            balance_after: balances.current,
            metadata,
            created_at: now,
        };

        uow.insert_entry(entry.clone());
        uow.update_account(account);
        uow.commit().await?;

        tracing::info!(
            sequence = entry.sequence,
            amount = %entry.amount.value(),
            balance_after = %entry.balance_after,
            reference = %entry.reference,
            "ledger entry recorded"
        );
        Ok(entry)
    }

    pub async fn list_entries(
        &self,
        account_id: Uuid,
        filter: &EntryFilter,
        page: Pagination,
    ) -> Result<Vec<LedgerEntry>> {
        self.get_account(account_id).await?;
        self.store.list_for_account(account_id, filter, page).await
    }

    /// Replays the ledger from a zero balance and compares it with the account.
    pub async fn reconcile(&self, account_id: Uuid) -> Result<ReconciliationReport> {
        let account = self.get_account(account_id).await?;
        let entries = self.store.all_for_account(account_id).await?;

        let mut discrepancies = Vec::new();
        let mut replayed = BalanceSnapshot::ZERO;

        for (index, entry) in entries.iter().enumerate() {
            let expected_sequence = index as u64 + 1;
            if entry.sequence != expected_sequence {
                discrepancies.push(format!(
                    "entry {} has sequence {}, expected {expected_sequence}",
                    entry.reference, entry.sequence
                ));
            }
            match replayed.apply(entry.entry_type, entry.amount) {
                Ok(next) => replayed = next,
                Err(err) => {
                    discrepancies.push(format!(
                        "entry {} cannot be replayed: {err}",
                        entry.reference
                    ));
                    break;
                }
            }
            if entry.balance_after != replayed.current {
                discrepancies.push(format!(
                    "entry {} records balance {}, replay gives {}",
                    entry.reference, entry.balance_after, replayed.current
                ));
            }
        }

        let stored = account.balances();
        if stored != replayed {
            discrepancies.push(format!(
                "stored balances {stored:?} differ from replayed {replayed:?}"
            ));
        }
        if account.ledger_sequence != entries.len() as u64 {
            discrepancies.push(format!(
                "account sequence {} but {} entries found",
                account.ledger_sequence,
                entries.len()
            ));
        }

        if !discrepancies.is_empty() {
            tracing::warn!(account_id = %account_id, count = discrepancies.len(), "ledger out of balance");
        }
        Ok(ReconciliationReport {
            account_id,
            entries_replayed: entries.len(),
            stored,
            replayed,
            discrepancies,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| LedgerError::validation("occurredAt", format!("'{raw}' is not RFC 3339: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{AccountType, Balance};
    use crate::domain::metadata::{CLOSED_LOOP_NON_CASH, EntryMetadata, RegulatoryClassification};
    use crate::health::{HealthRegistry, PAYMENTS_CORE};
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct CountingReferences(std::sync::atomic::AtomicU32);

    impl ReferenceGenerator for CountingReferences {
        fn generate(&self) -> String {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            format!("ref-{n}")
        }
    }

    fn owner(user_id: u64) -> AccountOwner {
        AccountOwner {
            user_id,
            profile_id: 10,
            account_type: AccountType::Freelancer,
        }
    }

    fn engine_with(registry: HealthRegistry) -> LedgerEngine {
        LedgerEngine::new(
            Box::new(InMemoryLedgerStore::new()),
            HealthGate::new(registry),
        )
    }

    fn engine() -> LedgerEngine {
        engine_with(HealthRegistry::with_dependencies(LEDGER_DEPENDENCIES))
    }

    async fn open(engine: &LedgerEngine) -> Uuid {
        let (account, _) = engine
            .open_account(NewWalletAccount::for_owner(owner(1)))
            .await
            .unwrap();
        account.id
    }

    async fn record(
        engine: &LedgerEngine,
        id: Uuid,
        kind: &str,
        amount: rust_decimal::Decimal,
    ) -> Result<LedgerEntry> {
        engine
            .record_ledger_entry(id, LedgerEntryRequest::new(kind, amount))
            .await
    }

    #[tokio::test]
    async fn test_open_account_is_idempotent() {
        let engine = engine();
        let (first, created) = engine
            .open_account(NewWalletAccount::for_owner(owner(1)))
            .await
            .unwrap();
        let (second, created_again) = engine
            .open_account(NewWalletAccount {
                currency_code: Some("eur".to_string()),
                ..NewWalletAccount::for_owner(owner(1))
            })
            .await
            .unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert_eq!(second.currency_code, DEFAULT_CURRENCY);
        assert_eq!(engine.accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_credit_rounds_amount() {
        let engine = engine();
        let id = open(&engine).await;

        let entry = record(&engine, id, "credit", dec!(100.123456)).await.unwrap();
        assert_eq!(entry.amount.value(), dec!(100.1235));
        assert_eq!(entry.balance_after, Balance::new(dec!(100.1235)));
        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.currency_code, "USD");
        assert!(entry.reference.starts_with("wl_"));

        let account = engine.get_account(id).await.unwrap();
        assert_eq!(account.current_balance, Balance::new(dec!(100.1235)));
        assert_eq!(account.available_balance, Balance::new(dec!(100.1235)));
        assert_eq!(account.pending_hold_balance, Balance::ZERO);
        assert!(account.last_reconciled_at.is_some());
    }

    #[tokio::test]
    async fn test_entry_type_is_normalized() {
        let engine = engine();
        let id = open(&engine).await;

        let entry = record(&engine, id, "  CrEdIt ", dec!(1)).await.unwrap();
        assert_eq!(entry.entry_type, EntryType::Credit);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let engine = engine();
        let missing = Uuid::new_v4();
        assert!(matches!(
            record(&engine, missing, "credit", dec!(1)).await,
            Err(LedgerError::NotFound { account_id }) if account_id == missing
        ));
    }

    #[tokio::test]
    async fn test_insufficient_funds_debit_leaves_balances() {
        let engine = engine();
        let id = open(&engine).await;
        record(&engine, id, "credit", dec!(10)).await.unwrap();

        let result = record(&engine, id, "debit", dec!(25)).await;
        assert!(matches!(result, Err(LedgerError::Conflict(_))));

        let account = engine.get_account(id).await.unwrap();
        assert_eq!(account.available_balance, Balance::new(dec!(10)));
        assert_eq!(account.ledger_sequence, 1);
        let entries = engine
            .list_entries(id, &EntryFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_balance_overflow_is_rejected() {
        let engine = engine();
        let id = open(&engine).await;
        let huge = dec!(50000000000000000000000000000);
        record(&engine, id, "credit", huge).await.unwrap();

        let err = record(&engine, id, "credit", huge).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "amount", .. }));

        let account = engine.get_account(id).await.unwrap();
        assert_eq!(account.current_balance, Balance::new(huge));
        assert_eq!(account.ledger_sequence, 1);
        assert!(engine.reconcile(id).await.unwrap().is_balanced());
    }

    #[tokio::test]
    async fn test_hold_then_release() {
        let engine = engine();
        let id = open(&engine).await;
        record(&engine, id, "credit", dec!(50)).await.unwrap();

        let hold = record(&engine, id, "hold", dec!(20)).await.unwrap();
        assert_eq!(hold.balance_after, Balance::new(dec!(50)));
        let account = engine.get_account(id).await.unwrap();
        assert_eq!(account.available_balance, Balance::new(dec!(30)));
        assert_eq!(account.pending_hold_balance, Balance::new(dec!(20)));

        let release = record(&engine, id, "release", dec!(20)).await.unwrap();
        assert_eq!(release.balance_after, Balance::new(dec!(50)));
        let account = engine.get_account(id).await.unwrap();
        assert_eq!(account.available_balance, Balance::new(dec!(50)));
        assert_eq!(account.pending_hold_balance, Balance::ZERO);
        assert_eq!(account.current_balance, Balance::new(dec!(50)));
    }

    #[tokio::test]
    async fn test_release_without_hold_conflicts() {
        let engine = engine();
        let id = open(&engine).await;
        record(&engine, id, "credit", dec!(50)).await.unwrap();

        let err = record(&engine, id, "release", dec!(5)).await.unwrap_err();
        assert!(err.to_string().contains("no matching held funds"));
    }

    #[tokio::test]
    async fn test_zero_and_negative_amounts_rejected() {
        let engine = engine();
        let id = open(&engine).await;

        for amount in [dec!(0), dec!(-5), dec!(0.00001)] {
            assert!(matches!(
                record(&engine, id, "credit", amount).await,
                Err(LedgerError::Validation { field: "amount", .. })
            ));
        }
        assert_eq!(engine.get_account(id).await.unwrap().ledger_sequence, 0);
    }

    #[tokio::test]
    async fn test_compliance_stamping_and_rejection() {
        let engine = engine();
        let id = open(&engine).await;

        let entry = record(&engine, id, "credit", dec!(5)).await.unwrap();
        assert_eq!(
            entry.metadata.regulatory_classification,
            RegulatoryClassification::ClosedLoopNonCash
        );
        assert!(entry.metadata.ios_iap_compliant);
        assert!(!entry.metadata.fca_supervision_required);

        let mut request = LedgerEntryRequest::new("credit", dec!(5));
        request.metadata = EntryMetadata {
            regulatory_classification: Some("e_money".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            engine.record_ledger_entry(id, request).await,
            Err(LedgerError::Validation { .. })
        ));

        let mut request = LedgerEntryRequest::new("credit", dec!(5));
        request.metadata = EntryMetadata {
            regulatory_classification: Some(CLOSED_LOOP_NON_CASH.to_string()),
            ios_iap_compliant: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            engine.record_ledger_entry(id, request).await,
            Err(LedgerError::Validation { .. })
        ));

        assert_eq!(engine.get_account(id).await.unwrap().ledger_sequence, 1);
    }

    #[tokio::test]
    async fn test_request_defaults_and_overrides() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let engine = engine()
            .with_clock(Arc::new(FixedClock(now)))
            .with_reference_generator(Arc::new(CountingReferences(Default::default())));
        let id = open(&engine).await;

        let defaulted = record(&engine, id, "credit", dec!(1)).await.unwrap();
        assert_eq!(defaulted.occurred_at, now);
        assert_eq!(defaulted.reference, "ref-0");

        let request = LedgerEntryRequest {
            currency_code: Some(" gbp ".to_string()),
            reference: Some("order-42".to_string()),
            occurred_at: Some("2024-12-31T23:00:00+01:00".to_string()),
            initiated_by_id: Some(7),
            ..LedgerEntryRequest::new("credit", dec!(1))
        };
        let entry = engine.record_ledger_entry(id, request).await.unwrap();
        assert_eq!(entry.currency_code, "GBP");
        assert_eq!(entry.reference, "order-42");
        assert_eq!(
            entry.occurred_at,
            Utc.with_ymd_and_hms(2024, 12, 31, 22, 0, 0).unwrap()
        );
        assert_eq!(entry.initiated_by_id, Some(7));
        assert_eq!(entry.created_at, now);
    }

    #[tokio::test]
    async fn test_invalid_timestamp_and_currency() {
        let engine = engine();
        let id = open(&engine).await;

        let request = LedgerEntryRequest {
            occurred_at: Some("yesterday".to_string()),
            ..LedgerEntryRequest::new("credit", dec!(1))
        };
        assert!(matches!(
            engine.record_ledger_entry(id, request).await,
            Err(LedgerError::Validation { field: "occurredAt", .. })
        ));

        let request = LedgerEntryRequest {
            currency_code: Some("dollars".to_string()),
            ..LedgerEntryRequest::new("credit", dec!(1))
        };
        assert!(matches!(
            engine.record_ledger_entry(id, request).await,
            Err(LedgerError::Validation { field: "currencyCode", .. })
        ));
    }

    #[tokio::test]
    async fn test_gate_blocks_before_validation() {
        let registry = HealthRegistry::with_dependencies(LEDGER_DEPENDENCIES);
        let engine = engine_with(registry.clone());
        let id = open(&engine).await;

        registry.mark_unavailable(PAYMENTS_CORE, "processor timeout");
        // Even an invalid amount reports the outage first.
        let err = record(&engine, id, "credit", dec!(0)).await.unwrap_err();
        match &err {
            LedgerError::ServiceUnavailable { feature, failures } => {
                assert_eq!(feature.as_deref(), Some("wallet_ledger:credit"));
                assert_eq!(failures[0].name, PAYMENTS_CORE);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        registry.mark_healthy(PAYMENTS_CORE);
        record(&engine, id, "credit", dec!(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_adjustments() {
        let engine = engine();
        let id = open(&engine).await;
        record(&engine, id, "adjustment", dec!(8)).await.unwrap();
        let entry = record(&engine, id, "adjustment_debit", dec!(3)).await.unwrap();
        assert_eq!(entry.balance_after, Balance::new(dec!(5)));
        assert!(record(&engine, id, "adjustment_debit", dec!(6)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_account() {
        let engine = engine();
        let id = open(&engine).await;

        let updated = engine
            .update_account(
                id,
                AccountUpdate {
                    status: Some(AccountStatus::Suspended),
                    custody_provider: Some(CustodyProvider::Stripe),
                    provider_account_id: Some(Some("acct_1".to_string())),
                    currency_code: Some("eur".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, AccountStatus::Suspended);
        assert_eq!(updated.currency_code, "EUR");
        assert_eq!(engine.get_account(id).await.unwrap(), updated);

        record(&engine, id, "credit", dec!(1)).await.unwrap();
        let result = engine
            .update_account(
                id,
                AccountUpdate {
                    currency_code: Some("USD".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(LedgerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_reconcile_after_mixed_operations() {
        let engine = engine();
        let id = open(&engine).await;
        record(&engine, id, "credit", dec!(100)).await.unwrap();
        record(&engine, id, "hold", dec!(40)).await.unwrap();
        record(&engine, id, "debit", dec!(10.5)).await.unwrap();
        record(&engine, id, "release", dec!(15)).await.unwrap();
        let _ = record(&engine, id, "debit", dec!(1000)).await;

        let report = engine.reconcile(id).await.unwrap();
        assert!(report.is_balanced(), "{:?}", report.discrepancies);
        assert_eq!(report.entries_replayed, 4);
        assert_eq!(report.replayed.current, Balance::new(dec!(89.5)));
        assert_eq!(report.replayed.hold, Balance::new(dec!(25)));
    }
}
