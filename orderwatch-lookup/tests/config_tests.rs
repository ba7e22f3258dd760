//! Service configuration resolution tests
//!
//! Marked #[serial]: they set ORDERWATCH_* environment variables.

use orderwatch_common::config::{
    TomlConfig, DATABASE_FILE, DEFAULT_PORT, ENV_API_TOKEN, ENV_DATA_FOLDER, ENV_REMOTE_URL,
};
use orderwatch_lookup::config::{CliOverrides, ServiceConfig};
use orderwatch_lookup::db::open_result_cache;
use serial_test::serial;
use std::env;
use std::time::Duration;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(ENV_DATA_FOLDER);
    env::remove_var(ENV_REMOTE_URL);
    env::remove_var(ENV_API_TOKEN);
}

fn toml_with_folder(dir: &TempDir) -> TomlConfig {
    TomlConfig {
        data_folder: Some(dir.path().join("from-toml")),
        ..TomlConfig::default()
    }
}

#[test]
#[serial]
fn test_defaults_from_toml() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let toml = toml_with_folder(&dir);

    let config = ServiceConfig::resolve(&CliOverrides::default(), &toml);

    assert_eq!(config.data_folder, dir.path().join("from-toml"));
    assert_eq!(
        config.database_path,
        Some(dir.path().join("from-toml").join(DATABASE_FILE))
    );
    assert!(config.data_folder.is_dir());
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.api_token, None);
    assert_eq!(config.cache_ttl(), Duration::from_secs(1800));
    assert_eq!(config.request_timeout, Duration::from_secs(120));
    assert_eq!(config.lookup.batch_size, 2000);
}

#[test]
#[serial]
fn test_cli_beats_env_beats_toml() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let mut toml = toml_with_folder(&dir);
    toml.remote.base_url = Some("http://toml:5000".to_string());
    toml.remote.api_token = Some("toml-token".to_string());

    env::set_var(ENV_REMOTE_URL, "http://env:5000");
    env::set_var(ENV_API_TOKEN, "env-token");

    let config = ServiceConfig::resolve(&CliOverrides::default(), &toml);
    assert_eq!(config.remote_base_url, "http://env:5000");
    assert_eq!(config.api_token.as_deref(), Some("env-token"));

    let cli = CliOverrides {
        remote_url: Some("http://cli:5000".to_string()),
        data_folder: Some(dir.path().join("from-cli")),
        port: Some(6000),
        ..CliOverrides::default()
    };
    let config = ServiceConfig::resolve(&cli, &toml);
    assert_eq!(config.remote_base_url, "http://cli:5000");
    assert_eq!(config.data_folder, dir.path().join("from-cli"));
    assert_eq!(config.port, 6000);

    clear_env();
}

#[test]
#[serial]
fn test_toml_token_used_without_env() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let mut toml = toml_with_folder(&dir);
    toml.remote.api_token = Some("toml-token".to_string());
    toml.port = Some(7000);

    let config = ServiceConfig::resolve(&CliOverrides::default(), &toml);

    assert_eq!(config.api_token.as_deref(), Some("toml-token"));
    assert_eq!(config.port, 7000);
}

#[tokio::test]
#[serial]
async fn test_unusable_data_folder_disables_cache() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"plain file").unwrap();

    let cli = CliOverrides {
        data_folder: Some(blocker.join("orderwatch")),
        ..CliOverrides::default()
    };
    let config = ServiceConfig::resolve(&cli, &TomlConfig::default());

    assert_eq!(config.data_folder, blocker.join("orderwatch"));
    assert_eq!(config.database_path, None);

    let cache = open_result_cache(config.database_path.as_deref(), config.cache_ttl()).await;
    assert!(!cache.is_enabled());
}

#[tokio::test]
async fn test_open_result_cache_in_data_folder() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(DATABASE_FILE);

    let cache = open_result_cache(Some(&db_path), Duration::from_secs(60)).await;

    assert!(cache.is_enabled());
    assert!(db_path.exists());
}
