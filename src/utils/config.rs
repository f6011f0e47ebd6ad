// src/utils/config.rs
//! Engine configuration
//!
//! Sources are layered, later ones winning:
//!
//! 1. Built-in defaults
//! 2. `dining.toml` (or `.json`, `.yaml`) in the working directory, if present
//! 3. An explicit file passed to [`EngineConfig::load_from`]
//! 4. `DINING_*` environment variables, e.g. `DINING_TABLE__AGENTS=7`
//!
//! Loading does not validate; callers apply their own overrides first and
//! then call [`EngineConfig::validate`].

use crate::runtime::table::TableConfig;
use crate::utils::errors::{EngineError, Result};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub table: TableConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from the default sources
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering `path` above the working-directory file
    ///
    /// The result is not validated.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(File::with_name("dining").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix("DINING")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.table.validate()?;

        if self.logging.level.trim().is_empty() {
            return Err(EngineError::InvalidConfig("logging.level cannot be empty".into()));
        }

        Ok(())
    }
}
