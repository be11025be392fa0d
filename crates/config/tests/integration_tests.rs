//! Integration tests for the configuration system

use fieldsync_config::{
    AppConfig, Config, ConfigError, ConfigManager, ConfigSection, LogLevel, SyncSettings,
    CONFIG_VERSION,
};
use fieldsync_core::EntityType;
use std::path::PathBuf;
use tempfile::TempDir;

fn setup_test_manager() -> Result<(TempDir, ConfigManager), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new()?;
    let manager = ConfigManager::with_directory(temp_dir.path().to_path_buf());
    Ok((temp_dir, manager))
}

#[test]
fn test_full_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager()?;

    let created = manager.initialize()?;
    assert!(created);

    let config = manager.load()?;
    assert_eq!(config.version, CONFIG_VERSION);

    let mut modified = config.clone();
    modified.sync.conflict_strategy = "client-wins".to_string();
    modified.sync.entity_types = vec![EntityType::Trial, EntityType::Study];
    manager.save(&modified)?;

    let reloaded = manager.load()?;
    assert_eq!(reloaded.sync.conflict_strategy, "client-wins");
    assert_eq!(
        reloaded.sync.entity_types,
        vec![EntityType::Trial, EntityType::Study]
    );

    manager.reset()?;
    let after_reset = manager.load()?;
    assert_eq!(after_reset, Config::default());

    Ok(())
}

#[test]
fn test_partial_file_fills_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager()?;

    std::fs::write(
        manager.config_path(),
        r#"
[sync]
base_url = "https://sync.example.org/api"
entity_types = ["observation"]
"#,
    )?;

    let config = manager.load()?;
    assert_eq!(config.version, CONFIG_VERSION);
    assert_eq!(config.app, AppConfig::default());
    assert_eq!(config.sync.base_url, "https://sync.example.org/api");
    assert_eq!(config.sync.entity_types, vec![EntityType::Observation]);
    assert_eq!(config.sync.conflict_strategy, "server-wins");
    assert!(config.sync.auto_sync_on_reconnect);

    Ok(())
}

#[test]
fn test_invalid_values_load_but_do_not_save() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager()?;

    std::fs::write(
        manager.config_path(),
        "[sync]\nrequest_timeout_secs = 0\n",
    )?;

    let config = manager.load()?;
    assert_eq!(config.sync.request_timeout_secs, 0);
    assert!(matches!(
        manager.save(&config),
        Err(ConfigError::ValidationError(_))
    ));

    let problems = manager.validate()?;
    assert_eq!(problems.len(), 1);
    assert!(problems[0].contains("sync.request_timeout_secs"));

    Ok(())
}

#[test]
fn test_saved_file_is_readable_toml() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp_dir, manager) = setup_test_manager()?;

    manager.update(|config| {
        config.app.log_level = LogLevel::Debug;
        config.sync.connectivity_probe_url = Some("https://sync.example.org/health".to_string());
    })?;

    let contents = std::fs::read_to_string(manager.config_path())?;
    assert!(contents.contains("[app]"));
    assert!(contents.contains("[sync]"));
    assert!(contents.contains("log_level = \"debug\""));
    assert!(contents.contains("connectivity_probe_url"));

    Ok(())
}

#[test]
fn test_backup_written_on_second_save() -> Result<(), Box<dyn std::error::Error>> {
    let (temp_dir, manager) = setup_test_manager()?;

    manager.initialize()?;
    manager.update(|config| config.sync.auto_sync_on_reconnect = false)?;

    let backup = temp_dir.path().join("config.toml.backup");
    assert!(backup.exists());
    let previous: Config = toml::from_str(&std::fs::read_to_string(backup)?)?;
    assert!(previous.sync.auto_sync_on_reconnect);

    Ok(())
}

#[test]
fn test_section_merge() {
    let mut sync = SyncSettings::default();
    sync.merge(SyncSettings {
        request_timeout_secs: 5,
        ..SyncSettings::default()
    });
    assert_eq!(sync.request_timeout_secs, 5);
    assert_eq!(sync.section_name(), "sync");
}

#[test]
fn test_database_path_under_config_dir() -> Result<(), Box<dyn std::error::Error>> {
    let (temp_dir, manager) = setup_test_manager()?;

    let mut config = Config::default();
    config.app.database_path = PathBuf::from("data/field.db");

    assert_eq!(
        manager.database_path(&config),
        temp_dir.path().join("data").join("field.db")
    );
    Ok(())
}
