use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Default number of parallel workers, and therefore connections, used for a load.
pub const DEFAULT_WORKERS: usize = 4;

/// Default interval between progress log lines while a load is running.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1_000;

/// Fully resolved settings of a single load run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoadSettings {
    /// Connection parameters shared by every worker connection.
    pub connection: PgConnectionConfig,
    /// Name of the directory table files are copied into.
    #[serde(default)]
    pub table: String,
    /// Local file, glob pattern or directory to load.
    #[serde(default)]
    pub input: String,
    /// Path inside the directory table under which files are placed, the table root if absent.
    #[serde(default)]
    pub dest_path: Option<String>,
    /// Tag attached to every loaded file.
    #[serde(default)]
    pub tag: Option<String>,
    /// Requested number of workers. The effective count never exceeds the number of files.
    pub workers: usize,
    /// Whether a single failed file aborts the whole run.
    pub stop_on_error: bool,
    /// Interval between progress log lines.
    pub heartbeat_interval_ms: u64,
}

impl LoadSettings {
    /// Validates the [`LoadSettings`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.trim().is_empty() {
            return Err(ValidationError::MissingTable);
        }

        if self.input.trim().is_empty() {
            return Err(ValidationError::MissingInput);
        }

        if self.workers == 0 {
            return Err(ValidationError::WorkersZero);
        }

        if self.tag.as_deref().is_some_and(|tag| tag.is_empty()) {
            return Err(ValidationError::EmptyTag);
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(ValidationError::HeartbeatIntervalZero);
        }

        self.connection.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::TlsConfig;

    fn settings() -> LoadSettings {
        LoadSettings {
            connection: PgConnectionConfig {
                host: "localhost".to_string(),
                port: 5432,
                name: "postgres".to_string(),
                username: "postgres".to_string(),
                password: None,
                tls: TlsConfig::default(),
            },
            table: "dir_table".to_string(),
            input: "/data/incoming".to_string(),
            dest_path: None,
            tag: None,
            workers: DEFAULT_WORKERS,
            stop_on_error: false,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }

    #[test]
    fn valid_settings_pass() {
        assert!(settings().validate().is_ok());
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut settings = settings();
        settings.workers = 0;
        assert_eq!(settings.validate(), Err(ValidationError::WorkersZero));
    }

    #[test]
    fn blank_table_and_input_are_rejected() {
        let mut missing_table = settings();
        missing_table.table = "  ".to_string();
        assert_eq!(missing_table.validate(), Err(ValidationError::MissingTable));

        let mut missing_input = settings();
        missing_input.input = String::new();
        assert_eq!(missing_input.validate(), Err(ValidationError::MissingInput));
    }

    #[test]
    fn empty_tag_is_rejected() {
        let mut settings = settings();
        settings.tag = Some(String::new());
        assert_eq!(settings.validate(), Err(ValidationError::EmptyTag));
    }
}
