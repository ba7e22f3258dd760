//! Bootstrap configuration loading and data folder resolution
//!
//! The TOML file is optional. A missing or malformed file never aborts
//! startup: the loader logs a warning and falls back to compiled defaults.
//!
//! Resolution priority for values that can come from several places:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::status_groups::StatusGroups;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the data folder
pub const ENV_DATA_FOLDER: &str = "ORDERWATCH_DATA_FOLDER";
/// Environment variable overriding the remote service base URL
pub const ENV_REMOTE_URL: &str = "ORDERWATCH_REMOTE_URL";
/// Environment variable carrying the remote service bearer token
pub const ENV_API_TOKEN: &str = "ORDERWATCH_API_TOKEN";

/// Default HTTP port of the lookup service
pub const DEFAULT_PORT: u16 = 5731;

/// Name of the SQLite database file inside the data folder
pub const DATABASE_FILE: &str = "orderwatch.db";

/// Compiled fallback values used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_folder: PathBuf,
    pub log_level: String,
    pub remote_base_url: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_folder = dirs::data_local_dir()
            .map(|d| d.join("orderwatch"))
            .unwrap_or_else(|| PathBuf::from("./orderwatch_data"));

        Self {
            data_folder,
            log_level: "info".to_string(),
            remote_base_url: "http://127.0.0.1:5000".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[remote]` section: the order-status query service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// `[lookup.retry]` section: per-batch retry of transient fetch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per batch, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// `[lookup]` section: pipeline tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_transform_chunk_size")]
    pub transform_chunk_size: usize,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_batch_size() -> usize {
    2000
}

fn default_concurrency() -> usize {
    4
}

fn default_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_transform_chunk_size() -> usize {
    1000
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            cache_ttl_secs: default_cache_ttl_secs(),
            transform_chunk_size: default_transform_chunk_size(),
            retry: RetrySettings::default(),
        }
    }
}

/// Bootstrap configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_folder: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub lookup: LookupSettings,
    /// Replaces the built-in status groups when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_groups: Option<StatusGroups>,
}

impl TomlConfig {
    /// Configured status groups, or the built-in set
    pub fn status_groups(&self) -> StatusGroups {
        self.status_groups.clone().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

/// Default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("orderwatch").join("orderwatch.toml"))
}

/// Parse a configuration file, returning an error on I/O or syntax problems
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load the configuration file with graceful degradation
///
/// `None` means "use the default path". Missing or invalid files yield the
/// default configuration after a warning.
pub fn load_toml_config(path: Option<&Path>) -> TomlConfig {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            warn!("Could not determine config directory, using defaults");
            return TomlConfig::default();
        }
    };

    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return TomlConfig::default();
    }

    match read_toml_config(&path) {
        Ok(config) => {
            debug!(path = %path.display(), "Loaded config file");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
            TomlConfig::default()
        }
    }
}

/// Write a configuration file atomically (temp file + rename)
///
/// On Unix the file is restricted to the owner since it may carry the API
/// token.
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = target.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&temp_path, target)?;
    Ok(())
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    Environment,
    TomlFile,
}

/// Pick the highest-priority value among CLI, environment and TOML
///
/// Logs a warning naming the sources when more than one is set, since the
/// lower-priority ones are silently shadowed otherwise.
pub fn resolve_setting(
    name: &str,
    cli: Option<String>,
    env_var: &str,
    toml: Option<String>,
) -> Option<(String, ConfigSource)> {
    let env = std::env::var(env_var).ok().filter(|v| !v.trim().is_empty());

    let mut sources = Vec::new();
    if cli.is_some() {
        sources.push("command line");
    }
    if env.is_some() {
        sources.push(env_var);
    }
    if toml.is_some() {
        sources.push("config file");
    }
    if sources.len() > 1 {
        warn!(
            setting = name,
            sources = %sources.join(", "),
            "Setting provided by multiple sources, using {}",
            sources[0]
        );
    }

    cli.map(|v| (v, ConfigSource::Cli))
        .or_else(|| env.map(|v| (v, ConfigSource::Environment)))
        .or_else(|| toml.map(|v| (v, ConfigSource::TomlFile)))
}

/// Resolve the data folder (CLI → `ORDERWATCH_DATA_FOLDER` → TOML → default)
pub fn resolve_data_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    resolve_setting(
        "data_folder",
        cli_arg.map(|p| p.to_string_lossy().into_owned()),
        ENV_DATA_FOLDER,
        toml
            .data_folder
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
    )
    .map(|(value, _)| PathBuf::from(value))
    .unwrap_or_else(|| CompiledDefaults::for_current_platform().data_folder)
}

/// Create the data folder if needed and return the database path inside it
pub fn prepare_data_folder(data_folder: &Path) -> Result<PathBuf> {
    if !data_folder.exists() {
        std::fs::create_dir_all(data_folder)?;
        debug!(path = %data_folder.display(), "Created data folder");
    }
    Ok(data_folder.join(DATABASE_FILE))
}
