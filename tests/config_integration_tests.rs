//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Defaults when no file exists
//! - Save / load through the YAML file
//! - Partial files fall back to defaults per field
//! - Environment variables override the file
//! - Malformed files are reported, not silently replaced

use camino::Utf8PathBuf;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use updatejobs::{ConfigManager, OrchestratorConfig};

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), config_path.as_path());
    assert_eq!(
        manager.config_path(),
        config_path.join("updatejobs.yaml").as_path()
    );
}

#[test]
fn test_load_defaults_without_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load_with_environment(config::Map::new()).unwrap();

    assert_eq!(config.orchestration.progress_id_base, 2000);
    assert_eq!(
        config.orchestration.completion_timeout(),
        Duration::from_secs(3)
    );
    assert!(config.orchestration.download_before_install);
    assert!(!config.orchestration.force);
    assert_eq!(config.logging.log_prefix, "updatejobs");
}

#[test]
fn test_save_and_reload() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = OrchestratorConfig::default();
    config.orchestration.download_before_install = false;
    config.orchestration.force_quiet = true;
    config.logging.debug_mode = true;
    manager.save(&config).unwrap();

    assert!(manager.config_path().exists());
    let loaded = manager.load_with_environment(config::Map::new()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.config_path(),
        "orchestration:\n  completion_timeout_ms: 500\n",
    )
    .unwrap();

    let config = manager.load_with_environment(config::Map::new()).unwrap();
    assert_eq!(
        config.orchestration.completion_timeout(),
        Duration::from_millis(500)
    );
    assert_eq!(config.orchestration.progress_id_base, 2000);
    assert_eq!(config.logging, OrchestratorConfig::default().logging);
}

#[test]
fn test_environment_overrides_boolean() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    manager.save(&OrchestratorConfig::default()).unwrap();

    let mut vars = config::Map::new();
    vars.insert(
        "UPDATEJOBS__ORCHESTRATION__DOWNLOAD_BEFORE_INSTALL".to_string(),
        "false".to_string(),
    );
    vars.insert(
        "UPDATEJOBS__LOGGING__CONSOLE_OUTPUT".to_string(),
        "true".to_string(),
    );

    let config = manager.load_with_environment(vars).unwrap();
    assert!(!config.orchestration.download_before_install);
    assert!(config.logging.console_output);
}

#[test]
fn test_malformed_file_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.config_path(), "orchestration: [not, a, map\n").unwrap();

    let result = manager.load_with_environment(config::Map::new());
    assert!(result.is_err());
}
