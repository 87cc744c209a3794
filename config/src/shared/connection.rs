use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_postgres::{Config as TokioPgConnectOptions, config::SslMode as TokioPgSslMode};

use crate::shared::ValidationError;

/// Application name reported to the server for every loader connection.
pub const APP_NAME_LOADER: &str = "dirtableload";

/// Time allowed for establishing a single connection before the run is aborted.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Session settings applied to every loader connection.
///
/// Bulk copies of large files can run for a long time, so `statement_timeout` is disabled.
/// Lock waits are bounded by `lock_timeout`.
pub static LOADER_CONNECTION_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        client_encoding: "UTF8".to_string(),
        statement_timeout: 0,
        lock_timeout: 30_000,
        application_name: APP_NAME_LOADER.to_string(),
    });

#[derive(Debug, Clone)]
pub struct PgConnectionOptions {
    pub client_encoding: String,
    pub statement_timeout: u32,
    pub lock_timeout: u32,
    pub application_name: String,
}

impl PgConnectionOptions {
    /// Returns the options as a space-separated list of `-c key=value` pairs.
    pub fn to_options_string(&self) -> String {
        format!(
            "-c client_encoding={} -c statement_timeout={} -c lock_timeout={}",
            self.client_encoding, self.statement_timeout, self.lock_timeout,
        )
    }
}

/// Configuration for connecting to a Postgres database.
///
/// This struct holds all necessary connection parameters and settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the Postgres database to connect to.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. This field is sensitive and redacted in debug output.
    #[serde(default)]
    pub password: Option<SecretString>,
    /// TLS configuration for secure connections.
    #[serde(default)]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    /// Validates the [`PgConnectionConfig`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.tls.validate()
    }
}

/// TLS settings for secure Postgres connections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    /// Whether TLS is enabled for the connection.
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Validates the [`TlsConfig`].
    ///
    /// If [`TlsConfig::enabled`] is true, this method checks that [`TlsConfig::trusted_root_certs`] is not empty.
    ///
    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled but no certificates are provided.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// A trait which can be used to convert the implementation into crate specific connect
/// options.
pub trait IntoConnectOptions<Output> {
    /// Creates connection options for connecting to the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn with_db(&self) -> TokioPgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            TokioPgSslMode::Require
        } else {
            TokioPgSslMode::Prefer
        };

        let mut config = TokioPgConnectOptions::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.username)
            .dbname(&self.name)
            .application_name(&LOADER_CONNECTION_OPTIONS.application_name)
            .options(&LOADER_CONNECTION_OPTIONS.to_options_string())
            .connect_timeout(CONNECT_TIMEOUT)
            // Certificates are verified by rustls in the loader, here we only ask the
            // server to negotiate TLS.
            .ssl_mode(ssl_mode);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        config
    }
}
