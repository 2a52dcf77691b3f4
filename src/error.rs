use crate::health::DependencyFailure;
use miette::Diagnostic;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Diagnostic, Debug)]
pub enum LedgerError {
    #[error("Invalid {field}: {message}")]
    #[diagnostic(code(wallet_ledger::validation), help("correct the field and resubmit"))]
    Validation { field: &'static str, message: String },

    #[error("Wallet account {account_id} not found")]
    #[diagnostic(code(wallet_ledger::not_found))]
    NotFound { account_id: Uuid },

    #[error("Ledger conflict: {0}")]
    #[diagnostic(
        code(wallet_ledger::conflict),
        help("refresh the account balances before retrying")
    )]
    Conflict(String),

    #[error("{}", unavailable_message(.feature, .failures))]
    #[diagnostic(
        code(wallet_ledger::service_unavailable),
        help("a dependency is temporarily unavailable, retry later")
    )]
    ServiceUnavailable {
        feature: Option<String>,
        failures: Vec<DependencyFailure>,
    },

    #[error("Storage error: {0}")]
    #[diagnostic(code(wallet_ledger::storage))]
    Storage(String),

    #[error("CSV error: {0}")]
    #[diagnostic(code(wallet_ledger::csv))]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(wallet_ledger::io))]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(wallet_ledger::config))]
    Config(#[from] config::ConfigError),
}

fn unavailable_message(feature: &Option<String>, failures: &[DependencyFailure]) -> String {
    let listed = failures
        .iter()
        .map(|f| format!("{} ({})", f.name, f.reason.as_deref().unwrap_or("unknown")))
        .collect::<Vec<_>>()
        .join(", ");
    match feature {
        Some(feature) => format!("Service unavailable for {feature}: {listed}"),
        None => format!("Service unavailable: {listed}"),
    }
}

impl LedgerError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Only dependency outages are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Storage(_) | Self::Csv(_) | Self::Io(_) | Self::Config(_) => "internal",
        }
    }

    /// HTTP-equivalent status for whatever boundary wraps the engine.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::ServiceUnavailable { .. } => 503,
            _ => 500,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization error: {err}"))
    }
}
