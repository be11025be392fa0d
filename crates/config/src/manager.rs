//! Configuration manager - main API for config operations

use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// File name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Prefix of environment variable overrides
const ENV_PREFIX: &str = "FIELDSYNC";

/// Loads, saves and resolves paths of the configuration
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a manager for the platform config directory
    ///
    /// - Linux: `~/.config/fieldsync/`
    /// - macOS: `~/Library/Application Support/fieldsync/`
    /// - Windows: `%APPDATA%\fieldsync\`
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Ok(Self::with_directory(config_dir))
    }

    /// Creates a manager for an explicit config directory
    pub fn with_directory(config_dir: PathBuf) -> Self {
        let persistence = ConfigPersistence::new(config_dir.join(CONFIG_FILE_NAME));
        Self {
            persistence,
            config_dir,
        }
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "fieldsync")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "Could not determine user config directory".to_string(),
            })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Loads the configuration; a missing file yields the defaults
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Loads the configuration, falling back to defaults on any error
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {}, using defaults", e);
                Config::default()
            }
        }
    }

    /// Validates and saves the configuration
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Loads, modifies and saves the configuration
    ///
    /// ```rust,no_run
    /// # use fieldsync_config::ConfigManager;
    /// # let manager = ConfigManager::new().unwrap();
    /// manager.update(|config| {
    ///     config.sync.conflict_strategy = "manual".to_string();
    /// }).expect("Failed to update config");
    /// ```
    pub fn update<F>(&self, update_fn: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        update_fn(&mut config);
        self.save(&config)
    }

    /// Writes a default config file unless one exists
    ///
    /// Returns true if a new file was created.
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            log::info!(
                "Config file already exists at {}",
                self.config_path().display()
            );
            return Ok(false);
        }

        self.save(&Config::default())?;
        log::info!("Generated default config at {}", self.config_path().display());
        Ok(true)
    }

    /// Overwrites the config file with defaults
    pub fn reset(&self) -> ConfigResult<()> {
        self.save(&Config::default())
    }

    /// Validation messages for the current file; empty when valid
    pub fn validate(&self) -> ConfigResult<Vec<String>> {
        let config = self.load()?;

        match config.validate() {
            Ok(()) => Ok(Vec::new()),
            Err(errors) => Ok(errors.iter().map(|e| e.to_string()).collect()),
        }
    }

    /// Absolute database path; relative paths are taken from the config dir
    pub fn database_path(&self, config: &Config) -> PathBuf {
        if config.app.database_path.is_absolute() {
            config.app.database_path.clone()
        } else {
            self.config_dir.join(&config.app.database_path)
        }
    }

    /// Loads the config and applies `FIELDSYNC_<SECTION>_<FIELD>` overrides
    ///
    /// Supported: `FIELDSYNC_APP_DATABASE_PATH`, `FIELDSYNC_APP_LOG_LEVEL`,
    /// `FIELDSYNC_SYNC_BASE_URL`, `FIELDSYNC_SYNC_CONFLICT_STRATEGY`.
    /// Unparsable values are ignored with a warning.
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        apply_env_overrides(&mut config, |name| std::env::var(name).ok());

        if let Err(errors) = config.validate() {
            log::warn!(
                "Config validation warnings after env overrides: {}",
                crate::error::join_errors(&errors)
            );
        }

        Ok(config)
    }
}

fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |section: &str, field: &str| lookup(&format!("{}_{}_{}", ENV_PREFIX, section, field));

    if let Some(path) = var("APP", "DATABASE_PATH") {
        config.app.database_path = PathBuf::from(path);
    }
    if let Some(level) = var("APP", "LOG_LEVEL") {
        match level.parse() {
            Ok(level) => config.app.log_level = level,
            Err(e) => log::warn!("Ignoring FIELDSYNC_APP_LOG_LEVEL: {}", e),
        }
    }
    if let Some(url) = var("SYNC", "BASE_URL") {
        config.sync.base_url = url;
    }
    if let Some(strategy) = var("SYNC", "CONFLICT_STRATEGY") {
        config.sync.conflict_strategy = strategy;
    }
}
