use crate::domain::account::{AccountOwner, AccountType};
use crate::domain::entry::LedgerEntryRequest;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a ledger batch file.
///
/// The owner columns select (or create) the wallet account; the remaining
/// columns become a [`LedgerEntryRequest`].
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct LedgerRecord {
    pub r#type: String,
    pub user: u64,
    pub profile: u64,
    pub account: AccountType,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LedgerRecord {
    pub fn owner(&self) -> AccountOwner {
        AccountOwner {
            user_id: self.user,
            profile_id: self.profile,
            account_type: self.account,
        }
    }

    pub fn into_request(self) -> LedgerEntryRequest {
        LedgerEntryRequest {
            currency_code: self.currency,
            reference: self.reference,
            occurred_at: self.occurred_at,
            description: self.description,
            ..LedgerEntryRequest::new(self.r#type, self.amount)
        }
    }
}

/// Reads ledger records from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<LedgerRecord>`.
/// It handles whitespace trimming and flexible record lengths automatically, so the
/// optional trailing columns may be left out.
pub struct LedgerRecordReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> LedgerRecordReader<R> {
    /// Creates a new `LedgerRecordReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes records.
    pub fn records(self) -> impl Iterator<Item = Result<LedgerRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "type, user, profile, account, amount, currency, reference\n\
                    credit, 1, 2, freelancer, 100.123456, usd, order-1\n\
                    Hold, 1, 2, freelancer, 0.5";
        let reader = LedgerRecordReader::new(data.as_bytes());
        let results: Vec<Result<LedgerRecord>> = reader.records().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.amount, dec!(100.123456));
        assert_eq!(first.account, AccountType::Freelancer);
        assert_eq!(first.reference.as_deref(), Some("order-1"));

        let second = results[1].as_ref().unwrap().clone();
        assert_eq!(second.currency, None);
        let request = second.into_request();
        assert_eq!(request.entry_type, "Hold");
        assert_eq!(request.amount, dec!(0.5));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "type, user, profile, account, amount\ncredit, 1, 1, bank, 1.0\ncredit, x, 1, user, 1.0";
        let reader = LedgerRecordReader::new(data.as_bytes());
        let results: Vec<Result<LedgerRecord>> = reader.records().collect();

        assert!(results[0].is_err());
        assert!(results[1].is_err());
    }
}
