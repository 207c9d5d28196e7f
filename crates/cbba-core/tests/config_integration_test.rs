use cbba_core::{CbbaConfig, ConfigError, ConfigManager};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("cbba.toml");

    ConfigManager::create_default_config(&config_path).unwrap();
    assert!(config_path.exists());

    let manager = ConfigManager::load_from(Some(&config_path)).unwrap();
    assert_eq!(manager.config().allocation, CbbaConfig::default().allocation);
    assert_eq!(manager.config_path(), Some(config_path.as_path()));
}

#[test]
fn test_partial_file_keeps_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("cbba.toml");
    fs::write(
        &config_path,
        "[allocation]\nreward = 25.0\n\n[mailbox]\ninbox_capacity = 16\n",
    )
    .unwrap();

    let manager = ConfigManager::load_from(Some(&config_path)).unwrap();
    let config = manager.config();
    assert_eq!(config.allocation.reward, 25.0);
    assert_eq!(config.mailbox.inbox_capacity, 16);
    assert_eq!(config.allocation.time_discount_factor, 0.95);
}

#[test]
fn test_missing_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    assert!(matches!(
        ConfigManager::load_from(Some(&missing)),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
fn test_invalid_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("cbba.toml");

    fs::write(&config_path, "[allocation\nreward = ").unwrap();
    assert!(matches!(
        ConfigManager::load_from(Some(&config_path)),
        Err(ConfigError::ParseError(_))
    ));

    fs::write(&config_path, "[allocation]\ntime_discount_factor = 1.5\n").unwrap();
    assert!(matches!(
        ConfigManager::load_from(Some(&config_path)),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_from_config_validates() {
    let mut config = CbbaConfig::default();
    config.allocation.max_speed = 0.0;
    assert!(ConfigManager::from_config(config).is_err());
    assert!(ConfigManager::from_config(CbbaConfig::default()).is_ok());
}
