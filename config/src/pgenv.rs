//! libpq-compatible connection defaults taken from the process environment.

use secrecy::SecretString;
use std::path::PathBuf;

/// Host used when neither the command line nor `PGHOST` name one.
pub const DEFAULT_HOST: &str = "localhost";

/// Port used when neither the command line nor `PGPORT` name one.
pub const DEFAULT_PORT: u16 = 5432;

/// User used when no user can be derived from the environment at all.
const FALLBACK_USER: &str = "postgres";

/// Name of the password file inside the home directory.
const PGPASS_FILE_NAME: &str = ".pgpass";

/// Connection defaults resolved from `PG*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct PgEnvironment {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    os_user: Option<String>,
    database: Option<String>,
    password: Option<String>,
    passfile: Option<PathBuf>,
    home: Option<PathBuf>,
}

impl PgEnvironment {
    /// Reads the defaults from the current process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the defaults through `lookup`, treating empty values as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        Self {
            host: get("PGHOST"),
            port: get("PGPORT").and_then(|port| port.parse().ok()),
            user: get("PGUSER"),
            os_user: get("USER").or_else(|| get("USERNAME")),
            database: get("PGDATABASE"),
            password: get("PGPASSWORD"),
            passfile: get("PGPASSFILE").map(PathBuf::from),
            home: get("HOME").map(PathBuf::from),
        }
    }

    pub fn host(&self) -> String {
        self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Returns `PGUSER`, falling back to the operating system user like libpq does.
    pub fn user(&self) -> String {
        self.user
            .clone()
            .or_else(|| self.os_user.clone())
            .unwrap_or_else(|| FALLBACK_USER.to_string())
    }

    /// Returns `PGDATABASE`, falling back to the user name like libpq does.
    pub fn database(&self) -> String {
        self.database.clone().unwrap_or_else(|| self.user())
    }

    pub fn password(&self) -> Option<SecretString> {
        self.password.clone().map(SecretString::new)
    }

    /// Returns the password file to consult: `PGPASSFILE` or `~/.pgpass`.
    pub fn passfile(&self) -> Option<PathBuf> {
        self.passfile
            .clone()
            .or_else(|| self.home.as_ref().map(|home| home.join(PGPASS_FILE_NAME)))
    }
}
