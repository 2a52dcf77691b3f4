//! Compliance metadata carried by every ledger entry.
//!
//! Callers submit an [`EntryMetadata`] whose compliance fields are optional.
//! [`ComplianceMetadata::stamp`] validates it and produces the stored form,
//! where the closed-loop fields are always present and always hold the same
//! values.

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CLOSED_LOOP_NON_CASH: &str = "closed_loop_non_cash";

pub const DEFAULT_IOS_IAP_JUSTIFICATION: &str = "Wallet balances settle platform services \
     delivered outside the app and are never sold as in-app digital goods.";

pub const DEFAULT_COMPLIANCE_SUMMARY: &str = "Closed-loop non-cash balance usable only within \
     the platform; not e-money, not redeemable for cash, no FCA supervision required.";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegulatoryClassification {
    #[default]
    ClosedLoopNonCash,
}

impl RegulatoryClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClosedLoopNonCash => CLOSED_LOOP_NON_CASH,
        }
    }
}

/// Metadata as submitted by a caller.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulatory_classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_iap_compliant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fca_supervision_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ios_iap_justification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_summary: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata as stored on a ledger entry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceMetadata {
    pub regulatory_classification: RegulatoryClassification,
    pub ios_iap_compliant: bool,
    pub fca_supervision_required: bool,
    pub ios_iap_justification: String,
    pub compliance_summary: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComplianceMetadata {
    /// Validates caller metadata and stamps the closed-loop compliance fields.
    ///
    /// A classification other than closed-loop, or `iosIapCompliant: false`,
    /// is rejected. Everything else is merged, with the stamped values winning.
    pub fn stamp(input: EntryMetadata) -> Result<Self, LedgerError> {
        if let Some(classification) = &input.regulatory_classification
            && !classification.trim().eq_ignore_ascii_case(CLOSED_LOOP_NON_CASH)
        {
            return Err(LedgerError::validation(
                "metadata.regulatoryClassification",
                format!(
                    "ledger entries are always {CLOSED_LOOP_NON_CASH}, got '{classification}'"
                ),
            ));
        }

        if input.ios_iap_compliant == Some(false) {
            return Err(LedgerError::validation(
                "metadata.iosIapCompliant",
                "ledger entries cannot depend on an in-app purchase flow",
            ));
        }

        let mut extra = input.extra;
        // Flattened keys that shadow the typed fields would be serialized twice.
        for key in [
            "regulatoryClassification",
            "iosIapCompliant",
            "fcaSupervisionRequired",
            "iosIapJustification",
            "complianceSummary",
        ] {
            extra.remove(key);
        }

        Ok(Self {
            regulatory_classification: RegulatoryClassification::ClosedLoopNonCash,
            ios_iap_compliant: true,
            fca_supervision_required: false,
            ios_iap_justification: non_blank(input.ios_iap_justification)
                .unwrap_or_else(|| DEFAULT_IOS_IAP_JUSTIFICATION.to_string()),
            compliance_summary: non_blank(input.compliance_summary)
                .unwrap_or_else(|| DEFAULT_COMPLIANCE_SUMMARY.to_string()),
            extra,
        })
    }
}

impl From<ComplianceMetadata> for EntryMetadata {
    fn from(stored: ComplianceMetadata) -> Self {
        Self {
            regulatory_classification: Some(stored.regulatory_classification.as_str().to_string()),
            ios_iap_compliant: Some(stored.ios_iap_compliant),
            fca_supervision_required: Some(stored.fca_supervision_required),
            ios_iap_justification: Some(stored.ios_iap_justification),
            compliance_summary: Some(stored.compliance_summary),
            extra: stored.extra,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
