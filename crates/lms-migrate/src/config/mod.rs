//! Configuration loading and validation.
//!
//! Secrets and connection strings come from the environment; batch tuning
//! and report paths come from an optional YAML file. Both are combined into
//! a single [`Config`] at startup and passed to every component by reference.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use crate::storage::derive_token;
use std::path::Path;

/// Capabilities a command needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Destination storage credentials and endpoint.
    Storage,
    /// Source database connection string.
    SourceDatabase,
    /// Destination database connection string.
    TargetDatabase,
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env(migration: MigrationConfig) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), migration)
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F, migration: MigrationConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env_presence = KNOWN_ENV_VARS
            .iter()
            .map(|key| (*key, get(key).is_some()))
            .collect();

        let token = match (
            get(ENV_STORAGE_TOKEN),
            get(ENV_STORAGE_SECRET),
            get(ENV_STORAGE_APP_ID),
        ) {
            (Some(token), _, _) => Some(token),
            (None, Some(secret), Some(app_id)) => {
                let region = get(ENV_STORAGE_REGION).unwrap_or_else(default_region);
                Some(derive_token(&secret, &app_id, &region)?)
            }
            _ => None,
        };

        let storage = match (token, get(ENV_STORAGE_UPLOAD_URL)) {
            (Some(token), Some(upload_url)) => Some(StorageConfig { token, upload_url }),
            _ => None,
        };

        let ssl_mode = get(ENV_DATABASE_SSL_MODE).unwrap_or_else(default_ssl_mode);
        let database = |key: &str| {
            get(key).map(|url| DatabaseConfig {
                url,
                ssl_mode: ssl_mode.clone(),
            })
        };

        let config = Config {
            storage,
            source: database(ENV_SOURCE_DATABASE_URL),
            target: database(ENV_TARGET_DATABASE_URL),
            migration,
            env_presence,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Fail with `ConfigurationMissing` unless every requirement is met.
    pub fn require(&self, needs: &[Requirement]) -> Result<()> {
        let mut missing = Vec::new();

        for need in needs {
            match need {
                Requirement::Storage if self.storage.is_none() => {
                    if !self.is_set(ENV_STORAGE_TOKEN)
                        && !(self.is_set(ENV_STORAGE_SECRET) && self.is_set(ENV_STORAGE_APP_ID))
                    {
                        missing.push(format!(
                            "{} (or {} + {})",
                            ENV_STORAGE_TOKEN, ENV_STORAGE_SECRET, ENV_STORAGE_APP_ID
                        ));
                    }
                    if !self.is_set(ENV_STORAGE_UPLOAD_URL) {
                        missing.push(ENV_STORAGE_UPLOAD_URL.to_string());
                    }
                }
                Requirement::SourceDatabase if self.source.is_none() => {
                    missing.push(ENV_SOURCE_DATABASE_URL.to_string());
                }
                Requirement::TargetDatabase if self.target.is_none() => {
                    missing.push(ENV_TARGET_DATABASE_URL.to_string());
                }
                _ => {}
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        Err(MigrateError::ConfigurationMissing {
            missing,
            diagnostic: self.env_diagnostic(),
        })
    }

    /// Storage configuration, or `ConfigurationMissing`.
    pub fn storage(&self) -> Result<&StorageConfig> {
        self.require(&[Requirement::Storage])?;
        self.storage
            .as_ref()
            .ok_or_else(|| MigrateError::Config("storage configuration unavailable".into()))
    }

    /// Source database configuration, or `ConfigurationMissing`.
    pub fn source_database(&self) -> Result<&DatabaseConfig> {
        self.require(&[Requirement::SourceDatabase])?;
        self.source
            .as_ref()
            .ok_or_else(|| MigrateError::Config("source database unavailable".into()))
    }

    /// Destination database configuration, or `ConfigurationMissing`.
    pub fn target_database(&self) -> Result<&DatabaseConfig> {
        self.require(&[Requirement::TargetDatabase])?;
        self.target
            .as_ref()
            .ok_or_else(|| MigrateError::Config("target database unavailable".into()))
    }

    /// Human-readable list of known variables and whether each is set.
    pub fn env_diagnostic(&self) -> String {
        let mut out = String::from("Environment:");
        for (key, set) in &self.env_presence {
            out.push_str(&format!(
                "\n  {}: {}",
                key,
                if *set { "set" } else { "unset" }
            ));
        }
        out
    }

    fn is_set(&self, key: &str) -> bool {
        self.env_presence
            .iter()
            .any(|(name, set)| *name == key && *set)
    }
}

impl MigrationConfig {
    /// Load migration settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse migration settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
