//! Service configuration
//!
//! Combines command-line overrides, environment variables and the bootstrap
//! TOML file into the settings the lookup service runs with.

use orderwatch_common::config::{
    prepare_data_folder, resolve_data_folder, resolve_setting, CompiledDefaults, ConfigSource,
    LookupSettings, TomlConfig, ENV_API_TOKEN, ENV_REMOTE_URL,
};
use orderwatch_common::StatusGroups;
use std::path::PathBuf;
use std::time::Duration;

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub data_folder: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub api_token: Option<String>,
    pub port: Option<u16>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_folder: PathBuf,
    /// `None` when the data folder could not be prepared; the service then
    /// runs without a result cache
    pub database_path: Option<PathBuf>,
    pub remote_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub lookup: LookupSettings,
    pub status_groups: StatusGroups,
    pub port: u16,
}

impl ServiceConfig {
    /// Resolve every setting (CLI → environment → TOML → compiled default)
    /// and create the data folder
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Self {
        let defaults = CompiledDefaults::for_current_platform();

        let data_folder = resolve_data_folder(cli.data_folder.as_deref(), toml);
        let database_path = match prepare_data_folder(&data_folder) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(
                    path = %data_folder.display(),
                    error = %e,
                    "Data folder unavailable, result cache disabled"
                );
                None
            }
        };

        let remote_base_url = resolve_setting(
            "remote.base_url",
            cli.remote_url.clone(),
            ENV_REMOTE_URL,
            toml.remote.base_url.clone(),
        )
        .map(|(url, _)| url)
        .unwrap_or(defaults.remote_base_url);

        let api_token = match resolve_setting(
            "remote.api_token",
            cli.api_token.clone(),
            ENV_API_TOKEN,
            toml.remote.api_token.clone(),
        ) {
            Some((token, source)) => {
                if source == ConfigSource::Cli {
                    tracing::warn!("API token given on the command line; prefer {}", ENV_API_TOKEN);
                }
                Some(token)
            }
            None => {
                tracing::warn!("No API token configured; requests will be unauthenticated");
                None
            }
        };

        Self {
            data_folder,
            database_path,
            remote_base_url,
            api_token,
            request_timeout: Duration::from_secs(toml.remote.request_timeout_secs.max(1)),
            lookup: toml.lookup,
            status_groups: toml.status_groups(),
            port: cli.port.unwrap_or_else(|| toml.port()),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.lookup.cache_ttl_secs)
    }
}
