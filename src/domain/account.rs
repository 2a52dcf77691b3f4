use crate::domain::entry::EntryType;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use uuid::Uuid;

/// Decimal places kept for every stored amount and balance.
pub const AMOUNT_SCALE: u32 = 4;

/// Represents a monetary value with 4 decimal places precision.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific rules
/// and provide type safety for balance arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// Represents a positive monetary amount for ledger entries.
///
/// Construction rounds to [`AMOUNT_SCALE`] places, half away from zero, and
/// rejects anything that does not end up strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        let rounded =
            value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
        if rounded > Decimal::ZERO {
            Ok(Self(rounded))
        } else {
            Err(LedgerError::validation(
                "amount",
                format!("must be greater than zero after rounding, got {value}"),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}


/// The balance triple of a wallet account.
///
/// This is the only mutable ledger state; every entry type is a guarded,
/// pure transition over it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub current: Balance,
    pub available: Balance,
    pub hold: Balance,
}

impl BalanceSnapshot {
    pub const ZERO: Self = Self {
        current: Balance::ZERO,
        available: Balance::ZERO,
        hold: Balance::ZERO,
    };

    /// Returns the triple after applying `entry_type` for `amount`.
    ///
    /// Fails with `Conflict` when the precondition does not hold or the result
    /// would break `current == available + hold` or go negative. `self` is
    /// never modified.
    pub fn apply(&self, entry_type: EntryType, amount: Amount) -> Result<Self, LedgerError> {
        let amount = Balance::from(amount);
        let mut next = *self;

        match entry_type {
            EntryType::Credit | EntryType::Adjustment => {
                next.current = increase(next.current, amount)?;
                next.available = increase(next.available, amount)?;
            }
            EntryType::Debit | EntryType::AdjustmentDebit => {
                if next.available < amount {
                    return Err(LedgerError::Conflict(format!(
                        "insufficient available balance for {entry_type}: available {}, requested {}",
                        next.available, amount
                    )));
                }
                next.current = decrease(next.current, amount)?;
                next.available = decrease(next.available, amount)?;
            }
            EntryType::Hold => {
                if next.available < amount {
                    return Err(LedgerError::Conflict(format!(
                        "insufficient available balance to hold: available {}, requested {}",
                        next.available, amount
                    )));
                }
                next.available = decrease(next.available, amount)?;
                next.hold = increase(next.hold, amount)?;
            }
            EntryType::Release => {
                if next.hold < amount {
                    return Err(LedgerError::Conflict(format!(
                        "no matching held funds: held {}, requested {}",
                        next.hold, amount
                    )));
                }
                next.hold = decrease(next.hold, amount)?;
                next.available = increase(next.available, amount)?;
            }
        }

        next.check()?;
        Ok(next)
    }

    /// Verifies non-negativity and `current == available + hold`.
    pub fn check(&self) -> Result<(), LedgerError> {
        if self.current.is_negative() || self.available.is_negative() || self.hold.is_negative()
        {
            return Err(LedgerError::Conflict(
                "ledger balances cannot be negative".to_string(),
            ));
        }
        if self.available.checked_add(self.hold) != Some(self.current) {
            return Err(LedgerError::Conflict(format!(
                "ledger balances out of balance: current {} != available {} + hold {}",
                self.current, self.available, self.hold
            )));
        }
        Ok(())
    }
}

fn increase(balance: Balance, amount: Balance) -> Result<Balance, LedgerError> {
    balance
        .checked_add(amount)
        .ok_or_else(|| LedgerError::validation("amount", "amount would overflow the account balance"))
}

fn decrease(balance: Balance, amount: Balance) -> Result<Balance, LedgerError> {
    balance
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::validation("amount", "amount would overflow the account balance"))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    User,
    Freelancer,
    Company,
    Agency,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::User => "user",
            Self::Freelancer => "freelancer",
            Self::Company => "company",
            Self::Agency => "agency",
        };
        f.write_str(label)
    }
}

impl FromStr for AccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "freelancer" => Ok(Self::Freelancer),
            "company" => Ok(Self::Company),
            "agency" => Ok(Self::Agency),
            other => Err(LedgerError::validation(
                "accountType",
                format!("unsupported account type '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustodyProvider {
    #[default]
    Internal,
    Stripe,
    Wise,
    EscrowCom,
    Manual,
}

impl FromStr for CustodyProvider {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "stripe" => Ok(Self::Stripe),
            "wise" => Ok(Self::Wise),
            "escrow_com" | "escrow.com" => Ok(Self::EscrowCom),
            "manual" => Ok(Self::Manual),
            other => Err(LedgerError::validation(
                "custodyProvider",
                format!("unsupported custody provider '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Pending,
    Suspended,
    Closed,
}

impl FromStr for AccountStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "pending" => Ok(Self::Pending),
            "suspended" => Ok(Self::Suspended),
            "closed" => Ok(Self::Closed),
            other => Err(LedgerError::validation(
                "status",
                format!("unsupported account status '{other}'"),
            )),
        }
    }
}

/// Trims and uppercases a currency code, requiring exactly three ASCII letters.
pub fn normalize_currency(code: &str) -> Result<String, LedgerError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(LedgerError::validation(
            "currencyCode",
            format!("'{code}' is not a 3-letter ISO currency code"),
        ))
    }
}

/// Owner tuple that identifies a wallet account for find-or-create.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
pub struct AccountOwner {
    pub user_id: u64,
    pub profile_id: u64,
    pub account_type: AccountType,
}

/// Per-owner wallet account.
///
/// Balances are only ever written by the ledger engine.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletAccount {
    pub id: Uuid,
    pub user_id: u64,
    pub profile_id: u64,
    pub account_type: AccountType,
    pub custody_provider: CustodyProvider,
    pub provider_account_id: Option<String>,
    pub status: AccountStatus,
    pub current_balance: Balance,
    pub available_balance: Balance,
    pub pending_hold_balance: Balance,
    pub currency_code: String,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    /// Number of entries committed against this account.
    pub ledger_sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletAccount {
    pub fn new(owner: AccountOwner, currency_code: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: owner.user_id,
            profile_id: owner.profile_id,
            account_type: owner.account_type,
            custody_provider: CustodyProvider::Internal,
            provider_account_id: None,
            status: AccountStatus::Active,
            current_balance: Balance::ZERO,
            available_balance: Balance::ZERO,
            pending_hold_balance: Balance::ZERO,
            currency_code,
            last_reconciled_at: None,
            ledger_sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn owner(&self) -> AccountOwner {
        AccountOwner {
            user_id: self.user_id,
            profile_id: self.profile_id,
            account_type: self.account_type,
        }
    }

    pub fn balances(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            current: self.current_balance,
            available: self.available_balance,
            hold: self.pending_hold_balance,
        }
    }

    /// Writes a new balance triple and bumps the ledger sequence.
    pub fn apply_balances(&mut self, balances: BalanceSnapshot, at: DateTime<Utc>) {
        self.current_balance = balances.current;
        self.available_balance = balances.available;
        self.pending_hold_balance = balances.hold;
        self.ledger_sequence += 1;
        self.last_reconciled_at = Some(at);
        self.updated_at = at;
    }
}
