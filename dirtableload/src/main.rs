//! Command line tool loading local files into a directory table in parallel.
//!
//! Resolves settings from flags, the environment and an optional configuration file, opens one
//! connection per worker and streams every file with `COPY ... FROM STDIN`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser};
use config::SettingsOverrides;
use telemetry::tracing::{LogSettings, init_tracing};
use tracing::error;

use crate::core::run;
use crate::error::CliError;

mod core;
mod error;

#[derive(Debug, Parser)]
#[command(name = "dirtableload", version, about, disable_help_flag = true)]
struct AppArgs {
    #[clap(flatten)]
    connection: ConnectionArgs,

    #[clap(flatten)]
    load: LoadArgs,

    #[clap(flatten)]
    log: LogArgs,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    /// Database server host or socket directory [default: $PGHOST or localhost]
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Database server port [default: $PGPORT or 5432]
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Database user name [default: $PGUSER or the current user]
    #[arg(short = 'U', long)]
    user: Option<String>,

    /// Database name [default: $PGDATABASE or the user name]
    #[arg(short = 'd', long)]
    database: Option<String>,

    /// Prompt for the password before connecting
    #[arg(short = 'W', long)]
    password_prompt: bool,

    /// Require TLS for every connection
    #[arg(long)]
    tls: bool,

    /// PEM file with the root certificates trusted for TLS
    #[arg(long, value_name = "FILE")]
    tls_root_cert: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct LoadArgs {
    /// Directory table receiving the files
    #[arg(short = 't', long)]
    table: Option<String>,

    /// File, glob pattern or directory to load
    #[arg(short = 'f', long = "input-file", value_name = "PATH")]
    input: Option<String>,

    /// Path inside the directory table where files are placed
    #[arg(long)]
    dest_path: Option<String>,

    /// Tag attached to every loaded file
    #[arg(long)]
    tag: Option<String>,

    /// Number of parallel workers, each with its own connection [default: 4]
    #[arg(short = 'j', long = "tasks", value_name = "N")]
    workers: Option<usize>,

    /// Abort the whole load on the first failed file
    #[arg(long)]
    stop_on_error: bool,

    /// YAML or JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Interval between progress log lines, in milliseconds [default: 1000]
    #[arg(long, value_name = "MS")]
    heartbeat_ms: Option<u64>,
}

#[derive(Debug, Args)]
struct LogArgs {
    /// Also write logs to this file
    #[arg(short = 'l', long, value_name = "FILE")]
    logfile: Option<PathBuf>,

    /// Log at debug level
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl AppArgs {
    /// Flags that take precedence over every other configuration layer.
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            config_file: self.load.config.clone(),
            host: self.connection.host.clone(),
            port: self.connection.port,
            username: self.connection.user.clone(),
            database: self.connection.database.clone(),
            table: self.load.table.clone(),
            input: self.load.input.clone(),
            dest_path: self.load.dest_path.clone(),
            tag: self.load.tag.clone(),
            workers: self.load.workers,
            // Boolean flags can only switch a setting on.
            stop_on_error: self.load.stop_on_error.then_some(true),
            tls_enabled: self.connection.tls.then_some(true),
            tls_root_cert_file: self.connection.tls_root_cert.clone(),
            heartbeat_interval_ms: self.load.heartbeat_ms,
        }
    }

    fn log_settings(&self) -> LogSettings {
        LogSettings {
            verbose: self.log.verbose,
            log_file: self.log.logfile.clone(),
        }
    }
}

fn main() -> ExitCode {
    let args = AppArgs::parse();

    let _log_flusher = match init_tracing(env!("CARGO_BIN_NAME"), &args.log_settings()) {
        Ok(log_flusher) => log_flusher,
        Err(err) => {
            let err = CliError::config(err);
            eprint!("{}", err.render_report());
            return ExitCode::from(err.exit_code());
        }
    };

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::from)
        .and_then(|runtime| {
            runtime.block_on(run(args.overrides(), args.connection.password_prompt))
        });

    match result {
        Ok(report) => {
            println!("{report}");
            ExitCode::from(report.exit_code() as u8)
        }
        Err(err) => {
            error!("{err}");
            eprint!("{}", err.render_report());
            ExitCode::from(err.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        AppArgs::command().debug_assert();
    }

    #[test]
    fn short_flags_follow_libpq_tools() {
        let args = AppArgs::try_parse_from([
            "dirtableload",
            "-h",
            "db.internal",
            "-p",
            "6432",
            "-U",
            "loader",
            "-d",
            "warehouse",
            "-t",
            "dir_table",
            "-f",
            "/data/*.csv",
            "-j",
            "8",
            "--stop-on-error",
        ])
        .unwrap();

        let overrides = args.overrides();
        assert_eq!(overrides.host.as_deref(), Some("db.internal"));
        assert_eq!(overrides.port, Some(6432));
        assert_eq!(overrides.username.as_deref(), Some("loader"));
        assert_eq!(overrides.database.as_deref(), Some("warehouse"));
        assert_eq!(overrides.table.as_deref(), Some("dir_table"));
        assert_eq!(overrides.input.as_deref(), Some("/data/*.csv"));
        assert_eq!(overrides.workers, Some(8));
        assert_eq!(overrides.stop_on_error, Some(true));
        assert_eq!(overrides.tls_enabled, None);
        assert!(!args.connection.password_prompt);
    }

    #[test]
    fn unset_flags_leave_lower_layers_alone() {
        let args = AppArgs::try_parse_from(["dirtableload"]).unwrap();
        let overrides = args.overrides();

        assert!(overrides.host.is_none());
        assert!(overrides.stop_on_error.is_none());
        assert!(overrides.workers.is_none());
        assert!(!args.log_settings().verbose);
    }
}
