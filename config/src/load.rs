use std::path::{Path, PathBuf};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use rust_cli_config::{Config, Environment, File, Map};
use thiserror::Error;

use crate::pgenv::PgEnvironment;
use crate::shared::{DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_WORKERS, LoadSettings};

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "DIRTABLELOAD";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// The configuration file passed explicitly does not exist.
    #[error("configuration file `{0}` does not exist")]
    ConfigurationFileMissing(PathBuf),

    /// A configuration file existed but could not be parsed.
    #[error("failed to load configuration from `{path}`: {source}")]
    ConfigurationFileLoad {
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    /// The trusted root certificate file could not be read.
    #[error("failed to read trusted root certificates from `{path}`: {source}")]
    RootCertificates {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration sources were merged but deserialization failed.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    /// Failed to initialize the configuration builder.
    #[error("failed to initialize configuration builder: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),
}

/// Explicit overrides, usually coming from command line flags.
///
/// Every field left as `None` falls through to the lower configuration layers.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub config_file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub input: Option<String>,
    pub dest_path: Option<String>,
    pub tag: Option<String>,
    pub workers: Option<usize>,
    pub stop_on_error: Option<bool>,
    pub tls_enabled: Option<bool>,
    pub tls_root_cert_file: Option<PathBuf>,
    pub heartbeat_interval_ms: Option<u64>,
}

/// Loads [`LoadSettings`] from all configuration layers.
///
/// Layers, from lowest to highest precedence: defaults derived from `pg_env`, the optional
/// configuration file, `DIRTABLELOAD_`-prefixed environment variables (nested keys use double
/// underscores, e.g. `DIRTABLELOAD_CONNECTION__HOST`) and `overrides`. When no password is
/// configured anywhere, `PGPASSWORD` is used.
pub fn load_settings(
    overrides: &SettingsOverrides,
    pg_env: &PgEnvironment,
) -> Result<LoadSettings, LoadConfigError> {
    build_settings(overrides, pg_env, None)
}

fn build_settings(
    overrides: &SettingsOverrides,
    pg_env: &PgEnvironment,
    env_vars: Option<Map<String, String>>,
) -> Result<LoadSettings, LoadConfigError> {
    let mut builder = defaults(pg_env).map_err(LoadConfigError::Builder)?;

    if let Some(path) = &overrides.config_file {
        if !path.is_file() {
            return Err(LoadConfigError::ConfigurationFileMissing(path.clone()));
        }

        builder = builder.add_source(File::from(path.as_path()));
        validate_configuration_source(&builder, path)?;
    }

    let environment_source = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .source(env_vars);
    builder = builder.add_source(environment_source);

    builder = apply_overrides(builder, overrides)?;

    let mut settings = builder
        .build()
        .map_err(LoadConfigError::Builder)?
        .try_deserialize::<LoadSettings>()
        .map_err(LoadConfigError::Deserialization)?;

    if settings.connection.password.is_none() {
        settings.connection.password = pg_env.password();
    }

    Ok(settings)
}

fn defaults(
    pg_env: &PgEnvironment,
) -> Result<ConfigBuilder<DefaultState>, rust_cli_config::ConfigError> {
    Config::builder()
        .set_default("connection.host", pg_env.host())?
        .set_default("connection.port", i64::from(pg_env.port()))?
        .set_default("connection.username", pg_env.user())?
        .set_default("connection.name", pg_env.database())?
        .set_default("connection.tls.enabled", false)?
        .set_default("connection.tls.trusted_root_certs", "")?
        .set_default("workers", DEFAULT_WORKERS as u64)?
        .set_default("stop_on_error", false)?
        .set_default("heartbeat_interval_ms", DEFAULT_HEARTBEAT_INTERVAL_MS)
}

fn apply_overrides(
    builder: ConfigBuilder<DefaultState>,
    overrides: &SettingsOverrides,
) -> Result<ConfigBuilder<DefaultState>, LoadConfigError> {
    let trusted_root_certs = match &overrides.tls_root_cert_file {
        Some(path) => Some(std::fs::read_to_string(path).map_err(|source| {
            LoadConfigError::RootCertificates {
                path: path.clone(),
                source,
            }
        })?),
        None => None,
    };

    builder
        .set_override_option("connection.host", overrides.host.clone())
        .and_then(|b| b.set_override_option("connection.port", overrides.port.map(i64::from)))
        .and_then(|b| b.set_override_option("connection.username", overrides.username.clone()))
        .and_then(|b| b.set_override_option("connection.name", overrides.database.clone()))
        .and_then(|b| b.set_override_option("connection.tls.enabled", overrides.tls_enabled))
        .and_then(|b| b.set_override_option("connection.tls.trusted_root_certs", trusted_root_certs))
        .and_then(|b| b.set_override_option("table", overrides.table.clone()))
        .and_then(|b| b.set_override_option("input", overrides.input.clone()))
        .and_then(|b| b.set_override_option("dest_path", overrides.dest_path.clone()))
        .and_then(|b| b.set_override_option("tag", overrides.tag.clone()))
        .and_then(|b| b.set_override_option("workers", overrides.workers.map(|w| w as u64)))
        .and_then(|b| b.set_override_option("stop_on_error", overrides.stop_on_error))
        .and_then(|b| {
            b.set_override_option("heartbeat_interval_ms", overrides.heartbeat_interval_ms)
        })
        .map_err(LoadConfigError::Builder)
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}
