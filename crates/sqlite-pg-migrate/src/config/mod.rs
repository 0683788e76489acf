//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;
use uuid::Uuid;

/// Namespace used for identifier synthesis when the config does not set one.
pub const DEFAULT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d3e_8a4b_5c6d_9e0f_1a2b_3c4d_5e6f);

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl MigrationConfig {
    /// Namespace UUID for deterministic identifier synthesis.
    pub fn id_namespace(&self) -> Result<Uuid> {
        match &self.id_namespace {
            None => Ok(DEFAULT_ID_NAMESPACE),
            Some(raw) => Uuid::parse_str(raw).map_err(|e| {
                MigrateError::Config(format!(
                    "migration.id_namespace must be a UUID, got '{}': {}",
                    raw, e
                ))
            }),
        }
    }
}

impl TargetConfig {
    /// Human-readable target description for logs (password omitted).
    pub fn display_target(&self) -> String {
        format!(
            "{}@{}:{}/{} (schema {})",
            self.user, self.host, self.port, self.database, self.schema
        )
    }
}
