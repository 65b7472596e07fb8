use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::reset::{ResetOptions, DEFAULT_BATCH_SIZE, DEFAULT_BOOKKEEPING_TABLES};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ResetConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub reset: ResetSection,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Attached schema to operate on.
    pub schema: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResetSection {
    pub batch_size: usize,
    /// Migration-tracking tables a full reset never truncates.
    pub bookkeeping_tables: Vec<String>,
    pub require_confirmation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_reset_dir()
            .join("app.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            schema: "main".into(),
        }
    }
}

impl Default for ResetSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            bookkeeping_tables: DEFAULT_BOOKKEEPING_TABLES.iter().map(|t| t.to_string()).collect(),
            require_confirmation: true,
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Returns `~/.db-reset/`
pub fn default_reset_dir() -> PathBuf {
    home_dir().join(".db-reset")
}

/// Returns the default config file path: `~/.db-reset/config.toml`
pub fn default_config_path() -> PathBuf {
    default_reset_dir().join("config.toml")
}

impl ResetConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ResetConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (DB_RESET_DB, DB_RESET_LOG_LEVEL,
    /// DB_RESET_BATCH_SIZE).
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`. An unparsable batch size is
    /// ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("DB_RESET_DB") {
            self.storage.db_path = val;
        }
        if let Some(val) = lookup("DB_RESET_LOG_LEVEL") {
            self.logging.log_level = val;
        }
        if let Some(val) = lookup("DB_RESET_BATCH_SIZE") {
            match val.parse() {
                Ok(n) => self.reset.batch_size = n,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid DB_RESET_BATCH_SIZE"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn reset_options(&self) -> ResetOptions {
        ResetOptions {
            schema: self.storage.schema.clone(),
            bookkeeping_tables: self.reset.bookkeeping_tables.clone(),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}
