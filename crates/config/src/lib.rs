//! fieldsync configuration
//!
//! `config.toml` holds two sections, `[app]` and `[sync]`. Each implements
//! [`ConfigSection`] so it validates and merges itself.
//!
//! - A missing file means defaults; an empty or corrupt file is an error
//! - Saves are validated and atomic, and keep a backup of the previous file
//! - No panics: every failure is a [`ConfigError`]
//!
//! # Example
//!
//! ```rust
//! use fieldsync_config::{Config, ConfigManager};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let manager = ConfigManager::with_directory(dir.path().to_path_buf());
//! let config = manager.load().unwrap_or_else(|e| {
//!     eprintln!("Config error: {}, using defaults", e);
//!     Config::default()
//! });
//!
//! println!("Syncing with {}", config.sync.base_url);
//! ```

mod error;
mod manager;
mod persistence;
mod validation;

mod app_config;
mod sync_config;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::{ConfigManager, CONFIG_FILE_NAME};
pub use validation::{ConfigSection, Validator};

pub use app_config::{AppConfig, LogLevel};
pub use sync_config::{SyncSettings, CONFLICT_STRATEGIES};

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Config file format version
    pub version: u32,

    /// Local database and logging
    pub app: AppConfig,

    /// Remote store and sync behavior
    pub sync: SyncSettings,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates every section and returns all errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(mut e) = self.app.validate() {
            errors.append(&mut e);
        }
        if let Err(mut e) = self.sync.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Merges `other` into this config, preferring its values
    pub fn merge(&mut self, other: Config) {
        self.app.merge(other.app);
        self.sync.merge(other.sync);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            app: AppConfig::default(),
            sync: SyncSettings::default(),
        }
    }
}
