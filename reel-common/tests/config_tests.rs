//! Tests for configuration loading and root folder resolution
//!
//! Tests that touch REEL_ROOT_FOLDER are marked #[serial] so they never
//! race each other on the process environment.

use reel_common::config::{
    CompiledDefaults, RootFolderInitializer, RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert_eq!(defaults.database_file, "reel.db");
    assert!(defaults.root_folder.to_string_lossy().contains("reel"));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new(None, TomlConfig::default());
    let root_folder = resolver.resolve();

    let defaults = CompiledDefaults::for_current_platform();
    assert_eq!(root_folder, defaults.root_folder);
}

#[test]
#[serial]
fn test_resolver_cli_beats_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/reel-test-env-folder");

    let resolver = RootFolderResolver::new(
        Some(PathBuf::from("/tmp/reel-test-cli-folder")),
        TomlConfig::default(),
    );
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/reel-test-cli-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/reel-test-env-folder");

    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/reel-test-toml-folder")),
        ..Default::default()
    };
    let resolver = RootFolderResolver::new(None, toml);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/reel-test-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_uses_toml_when_env_missing() {
    env::remove_var(ROOT_FOLDER_ENV);

    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/reel-test-toml-folder")),
        ..Default::default()
    };
    let resolver = RootFolderResolver::new(None, toml);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/reel-test-toml-folder"));
}

#[test]
fn test_toml_parse_all_keys() {
    let config = TomlConfig::parse(
        r#"
        root_folder = "/data/reel"
        database_file = "catalog.db"
        log_level = "debug"
        default_strategy = "backfill"
        "#,
    )
    .unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/data/reel")));
    assert_eq!(config.database_file.as_deref(), Some("catalog.db"));
    assert_eq!(config.log_level(), "debug");
    assert_eq!(config.default_strategy.as_deref(), Some("backfill"));
}

#[test]
fn test_toml_parse_empty_uses_defaults() {
    let config = TomlConfig::parse("").unwrap();
    assert!(config.root_folder.is_none());
    assert_eq!(config.log_level(), "info");
}

#[test]
fn test_toml_parse_invalid_is_config_error() {
    let result = TomlConfig::parse("root_folder = [unterminated");
    assert!(matches!(result, Err(reel_common::Error::Config(_))));
}

#[test]
fn test_toml_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "log_level = \"warn\"\n").unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.log_level(), "warn");
}

#[test]
fn test_load_or_default_reports_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "log_level = [").unwrap();

    let (config, problem) = TomlConfig::load_or_default_from(Some(&path));
    assert!(config.log_level.is_none());
    assert!(problem.unwrap().contains("config.toml"));
}

#[test]
fn test_load_or_default_without_file() {
    let (config, problem) = TomlConfig::load_or_default_from(None);
    assert!(config.default_strategy.is_none());
    assert!(problem.is_none());
}

#[test]
fn test_initializer_creates_directory_and_database_path() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("reel");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();
    assert!(root.is_dir());

    assert_eq!(initializer.database_path(&TomlConfig::default()), root.join("reel.db"));

    let toml = TomlConfig {
        database_file: Some("other.db".to_string()),
        ..Default::default()
    };
    assert_eq!(initializer.database_path(&toml), root.join("other.db"));
}
