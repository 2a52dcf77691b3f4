use crate::domain::account::{Amount, Balance};
use crate::domain::metadata::{ComplianceMetadata, EntryMetadata};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of balance movement recorded by a ledger entry.
///
/// `Adjustment` is a positive correction (credit-like). Negative corrections
/// use `AdjustmentDebit`, which carries the same precondition as a debit.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Credit,
    Debit,
    Hold,
    Release,
    Adjustment,
    AdjustmentDebit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Hold => "hold",
            Self::Release => "release",
            Self::Adjustment => "adjustment",
            Self::AdjustmentDebit => "adjustment_debit",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            "hold" => Ok(Self::Hold),
            "release" => Ok(Self::Release),
            "adjustment" => Ok(Self::Adjustment),
            "adjustment_debit" => Ok(Self::AdjustmentDebit),
            other => Err(LedgerError::validation(
                "entryType",
                format!("unsupported entry type '{other}'"),
            )),
        }
    }
}

/// A request to record one ledger entry, as received from a caller.
///
/// Fields are kept loose (strings, raw decimals) so that normalization and
/// validation happen in one place inside the engine.
#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryRequest {
    pub entry_type: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub initiated_by_id: Option<u64>,
    /// RFC 3339 timestamp; defaults to now.
    #[serde(default)]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl LedgerEntryRequest {
    pub fn new(entry_type: impl Into<String>, amount: Decimal) -> Self {
        Self {
            entry_type: entry_type.into(),
            amount,
            ..Default::default()
        }
    }
}

/// An immutable, persisted ledger entry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub wallet_account_id: Uuid,
    /// Commit order within the account, starting at 1.
    pub sequence: u64,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub currency_code: String,
    pub reference: String,
    pub external_reference: Option<String>,
    pub description: Option<String>,
    pub initiated_by_id: Option<u64>,
    pub occurred_at: DateTime<Utc>,
    pub balance_after: Balance,
    pub metadata: ComplianceMetadata,
    pub created_at: DateTime<Utc>,
}

/// Read-side filter for listing entries.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub entry_type: Option<EntryType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub reference: Option<String>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.entry_type.is_none_or(|t| t == entry.entry_type)
            && self.from.is_none_or(|from| entry.occurred_at >= from)
            && self.to.is_none_or(|to| entry.occurred_at <= to)
            && self
                .reference
                .as_deref()
                .is_none_or(|r| r == entry.reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 500;

    /// Clamps `limit` into `1..=MAX_LIMIT`.
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

/// Sorts entries for display (`occurred_at`, then commit order) and applies
/// the filter and page.
pub fn select_page(
    mut entries: Vec<LedgerEntry>,
    filter: &EntryFilter,
    page: Pagination,
) -> Vec<LedgerEntry> {
    entries.retain(|e| filter.matches(e));
    entries.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then(a.sequence.cmp(&b.sequence))
    });
    entries
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect()
}
