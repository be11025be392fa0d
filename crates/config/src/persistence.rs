//! Reading and writing `config.toml`
//!
//! Saves validate first, keep a copy of the previous file and replace the
//! file through a temporary sibling, so a crash never leaves half a file.

use crate::error::join_errors;
use crate::{Config, ConfigError, ConfigResult, CONFIG_VERSION};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Handles configuration file persistence
pub struct ConfigPersistence {
    config_path: PathBuf,
}

impl ConfigPersistence {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Path of the copy kept from the previous save
    pub fn backup_path(&self) -> PathBuf {
        self.config_path.with_extension("toml.backup")
    }

    /// Loads configuration from file
    ///
    /// A missing file yields the defaults; an empty or unparsable file is
    /// an error. Validation problems are logged, not fatal, so a user can
    /// still start the tool to fix them.
    pub fn load(&self) -> ConfigResult<Config> {
        if !self.config_path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }

        let contents =
            fs::read_to_string(&self.config_path).map_err(|e| ConfigError::ReadError {
                path: self.config_path.clone(),
                source: e,
            })?;

        if contents.trim().is_empty() {
            return Err(ConfigError::EmptyFile {
                path: self.config_path.clone(),
            });
        }

        let config: Config = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: self.config_path.clone(),
            source: e,
        })?;

        if config.version != CONFIG_VERSION {
            log::warn!(
                "Config version {} differs from supported version {}; reading it as-is",
                config.version,
                CONFIG_VERSION
            );
        }

        if let Err(errors) = config.validate() {
            log::warn!("Config validation warnings: {}", join_errors(&errors));
        }

        Ok(config)
    }

    /// Validates and saves configuration atomically
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        config
            .validate()
            .map_err(|errors| ConfigError::ValidationError(join_errors(&errors)))?;

        let dir = self
            .config_path
            .parent()
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "Config path has no parent directory".to_string(),
            })?;
        ensure_directory_exists(dir)?;

        if self.config_path.exists() {
            fs::copy(&self.config_path, self.backup_path())
                .map_err(|e| ConfigError::BackupError { source: e })?;
            log::debug!("Backed up config to {}", self.backup_path().display());
        }

        let toml_string = toml::to_string_pretty(config)?;

        let mut temp_file = NamedTempFile::new_in(dir)?;
        temp_file.write_all(toml_string.as_bytes())?;
        temp_file.flush()?;
        temp_file
            .persist(&self.config_path)
            .map_err(|e| ConfigError::WriteError {
                path: self.config_path.clone(),
                source: e.error,
            })?;

        log::info!("Config saved to {}", self.config_path.display());
        Ok(())
    }
}

fn ensure_directory_exists(path: &Path) -> ConfigResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| ConfigError::DirectoryCreationError {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::info!("Created config directory: {}", path.display());
    }
    Ok(())
}
