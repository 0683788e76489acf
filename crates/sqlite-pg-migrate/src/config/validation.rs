//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.path.is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }
    if config.source.r#type != "sqlite" {
        return Err(MigrateError::Config(format!(
            "source.type must be 'sqlite', got '{}'",
            config.source.r#type
        )));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    if config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    // Migration config validation
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    config.migration.id_namespace()?;

    let mut seen = std::collections::HashSet::new();
    for table in &config.migration.tables {
        if table.trim().is_empty() {
            return Err(MigrateError::Config(
                "migration.tables contains an empty table name".into(),
            ));
        }
        if !seen.insert(table.as_str()) {
            return Err(MigrateError::Config(format!(
                "migration.tables lists '{}' more than once",
                table
            )));
        }
    }

    // Full rule checks happen when the registry is built.
    for (name, spec) in &config.tables {
        for (column, col) in &spec.columns {
            if col.compute.is_none() && !col.inputs.is_empty() {
                return Err(MigrateError::Config(format!(
                    "tables.{}.columns.{}: 'inputs' requires 'compute'",
                    name, column
                )));
            }
        }
    }

    let mut lookup_names = std::collections::HashSet::new();
    for lookup in &config.lookups {
        if !lookup_names.insert(lookup.name.as_str()) {
            return Err(MigrateError::Config(format!(
                "lookup '{}' is defined more than once",
                lookup.name
            )));
        }
    }

    Ok(())
}
