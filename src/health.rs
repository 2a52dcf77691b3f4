//! Dependency health registry and the gate that guards ledger mutations.
//!
//! The registry is an injectable handle rather than process-global state, so
//! every engine (and every test) owns the view of the world it is given.
//! Operational code pushes status transitions into the registry; the gate only
//! reads it.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

pub const DATABASE: &str = "database";
pub const PAYMENTS_CORE: &str = "paymentsCore";
pub const COMPLIANCE_PROVIDERS: &str = "complianceProviders";

/// Dependencies every ledger mutation requires.
pub const LEDGER_DEPENDENCIES: [&str; 3] = [DATABASE, PAYMENTS_CORE, COMPLIANCE_PROVIDERS];

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    Ok,
    Degraded,
    Error,
    Disabled,
    #[default]
    Unknown,
}

impl DependencyStatus {
    /// `Unknown` passes: a dependency nobody has reported on yet is not known to be down.
    pub fn is_failing(self) -> bool {
        matches!(self, Self::Error | Self::Degraded | Self::Disabled)
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Error => "error",
            Self::Disabled => "disabled",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

impl FromStr for DependencyStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" | "healthy" => Ok(Self::Ok),
            "degraded" => Ok(Self::Degraded),
            "error" | "unavailable" => Ok(Self::Error),
            "disabled" => Ok(Self::Disabled),
            "unknown" => Ok(Self::Unknown),
            other => Err(LedgerError::validation(
                "status",
                format!("unknown dependency status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DependencyState {
    pub status: DependencyStatus,
    pub reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One failing dependency as reported by [`HealthGate::assert_healthy`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyFailure {
    pub name: String,
    pub status: DependencyStatus,
    pub reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Thread-safe map of dependency name to its last reported state.
///
/// `Clone` shares the underlying map.
#[derive(Debug, Default, Clone)]
pub struct HealthRegistry {
    states: Arc<RwLock<HashMap<String, DependencyState>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every name registered as `Unknown`.
    pub fn with_dependencies<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let registry = Self::new();
        registry.register(names);
        registry
    }

    /// Registers names as `Unknown`, leaving already-known names untouched.
    pub fn register<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        for name in names {
            states.entry(name.to_string()).or_default();
        }
    }

    pub fn set_status(
        &self,
        name: &str,
        status: DependencyStatus,
        reason: Option<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        states.insert(
            name.to_string(),
            DependencyState {
                status,
                reason,
                updated_at: Some(Utc::now()),
                metadata,
            },
        );
        tracing::debug!(dependency = name, %status, "dependency status updated");
    }

    pub fn mark_healthy(&self, name: &str) {
        self.set_status(name, DependencyStatus::Ok, None, HashMap::new());
    }

    pub fn mark_unavailable(&self, name: &str, reason: impl Into<String>) {
        self.set_status(
            name,
            DependencyStatus::Error,
            Some(reason.into()),
            HashMap::new(),
        );
    }

    pub fn get(&self, name: &str) -> Option<DependencyState> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        states.get(name).cloned()
    }

    /// All known dependencies, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, DependencyState)> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = states
            .iter()
            .map(|(name, state)| (name.clone(), state.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[derive(Debug, Clone, Default)]
pub struct GateContext {
    pub feature: Option<String>,
}

impl GateContext {
    pub fn feature(feature: impl Into<String>) -> Self {
        Self {
            feature: Some(feature.into()),
        }
    }
}

/// Fail-fast guard over a [`HealthRegistry`]. Performs no retries.
#[derive(Debug, Clone)]
pub struct HealthGate {
    registry: HealthRegistry,
    enabled: bool,
}

impl HealthGate {
    pub fn new(registry: HealthRegistry) -> Self {
        Self {
            registry,
            enabled: true,
        }
    }

    /// A gate that always passes. Meant for tests of business logic only.
    pub fn disabled(registry: HealthRegistry) -> Self {
        Self {
            registry,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn registry(&self) -> &HealthRegistry {
        &self.registry
    }

    pub fn assert_healthy(&self, names: &[&str], context: &GateContext) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let states = self
            .registry
            .states
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let failures: Vec<DependencyFailure> = names
            .iter()
            .filter_map(|name| match states.get(*name) {
                None => Some(DependencyFailure {
                    name: name.to_string(),
                    status: DependencyStatus::Unknown,
                    reason: None,
                    updated_at: None,
                }),
                Some(state) if state.status.is_failing() => Some(DependencyFailure {
                    name: name.to_string(),
                    status: state.status,
                    reason: state.reason.clone(),
                    updated_at: state.updated_at,
                }),
                Some(_) => None,
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        tracing::warn!(
            feature = context.feature.as_deref().unwrap_or("-"),
            failing = failures.len(),
            "dependency gate tripped"
        );
        Err(LedgerError::ServiceUnavailable {
            feature: context.feature.clone(),
            failures,
        })
    }
}
