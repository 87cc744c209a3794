use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable that enables log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Crates whose chatter is capped at `warn` unless `RUST_LOG` says otherwise.
const NOISY_TARGETS: &[&str] = &["tokio_postgres", "rustls"];

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// The log file path does not name a file.
    #[error("log file `{0}` has no file name")]
    InvalidLogFile(PathBuf),

    /// The directory for the log file could not be created.
    #[error("failed to create log directory `{path}`: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A global subscriber or `log` logger was already installed.
    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Logging options of a single process.
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Lowers the default level from `info` to `debug`.
    pub verbose: bool,
    /// Additional file receiving a copy of every log line, without colors.
    pub log_file: Option<PathBuf>,
}

/// Keeps the background log file writer alive.
///
/// Buffered lines are flushed when the flusher is dropped, so it must be held until the
/// process is about to exit.
#[must_use = "dropping the flusher stops writing to the log file"]
pub struct LogFlusher {
    _guard: Option<WorkerGuard>,
}

/// Builds the filter directive used when `RUST_LOG` is not set.
fn default_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };

    let mut directive = level.to_string();
    for target in NOISY_TARGETS {
        directive.push_str(&format!(",{target}=warn"));
    }

    directive
}

/// Opens `path` for appending through a non-blocking writer, creating parent directories.
fn open_log_file(path: &Path) -> Result<(NonBlocking, WorkerGuard), TracingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| TracingError::InvalidLogFile(path.to_path_buf()))?;

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&directory).map_err(|source| TracingError::LogDirectory {
        path: directory.clone(),
        source,
    })?;

    let appender = tracing_appender::rolling::never(&directory, file_name);

    Ok(tracing_appender::non_blocking(appender))
}

/// Installs the global tracing subscriber.
///
/// Lines go to stdout and, when configured, to a log file. `RUST_LOG` overrides the default
/// level chosen from [`LogSettings::verbose`]. Records from crates using `log` are bridged.
pub fn init_tracing(app_name: &str, settings: &LogSettings) -> Result<LogFlusher, TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(settings.verbose)));

    let (file_layer, guard) = match &settings.log_file {
        Some(path) => {
            let (writer, guard) = open_log_file(path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    info!(
        app = app_name,
        log_file = ?settings.log_file,
        "logging initialized"
    );

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
pub fn init_test_tracing() {
    if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(true)));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_caps_noisy_targets() {
        assert_eq!(
            default_directive(false),
            "info,tokio_postgres=warn,rustls=warn"
        );
        assert!(default_directive(true).starts_with("debug,"));
    }

    #[test]
    fn log_file_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("load.log");

        let (_writer, _guard) = open_log_file(&path).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn log_file_needs_a_file_name() {
        let result = open_log_file(Path::new("/"));
        assert!(matches!(result, Err(TracingError::InvalidLogFile(_))));
    }
}
