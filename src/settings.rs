//! Layered configuration: optional TOML file, then `WALLET_LEDGER_*`
//! environment variables (nested keys separated by `__`).

use crate::error::Result;
use crate::health::{DependencyStatus, HealthGate, HealthRegistry, LEDGER_DEPENDENCIES};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/wallet-ledger.toml";
pub const ENV_PREFIX: &str = "WALLET_LEDGER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Ignored in production.
    pub enabled: bool,
    /// Initial status per dependency; unlisted ledger dependencies start `unknown`.
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dependencies: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: Environment,
    pub log_level: String,
    pub default_currency: String,
    pub health: HealthSettings,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            log_level: "info".to_string(),
            default_currency: crate::application::engine::DEFAULT_CURRENCY.to_string(),
            health: HealthSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `path` (if it exists) and the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Builds the registry with every ledger dependency registered, applying
    /// configured initial statuses.
    pub fn health_registry(&self) -> HealthRegistry {
        let registry = HealthRegistry::with_dependencies(LEDGER_DEPENDENCIES);
        for (name, status) in &self.health.dependencies {
            // Configuration sources may fold key case.
            let name = LEDGER_DEPENDENCIES
                .iter()
                .find(|known| known.eq_ignore_ascii_case(name))
                .copied()
                .unwrap_or(name.as_str());
            registry.set_status(
                name,
                *status,
                Some("configured at start-up".to_string()),
                HashMap::new(),
            );
        }
        registry
    }

    pub fn health_gate(&self, registry: HealthRegistry) -> HealthGate {
        if self.health.enabled {
            return HealthGate::new(registry);
        }
        if self.environment == Environment::Production {
            tracing::warn!("health gate cannot be disabled in production, keeping it enabled");
            return HealthGate::new(registry);
        }
        tracing::warn!(environment = ?self.environment, "health gate disabled");
        HealthGate::disabled(registry)
    }
}
