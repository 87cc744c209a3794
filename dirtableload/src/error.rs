use std::error::Error;
use std::fmt;

use loader::error::LoadError;

/// Exit status for errors raised before or outside of a load run.
const SETUP_ERROR_EXIT_CODE: u8 = 2;

/// Result type for command line operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that prevent a load run from starting or from being reported.
#[derive(Debug)]
pub enum CliError {
    /// Enumeration, connection or pool error.
    Load(LoadError),
    /// Invalid or unreadable configuration, including the password.
    Config(Box<dyn Error + Send + Sync>),
    /// I/O error, e.g. while setting up the runtime or signal handlers.
    Io(std::io::Error),
}

impl CliError {
    /// Creates a configuration error from any error source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        CliError::Config(Box::new(err))
    }

    /// Returns the process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        SETUP_ERROR_EXIT_CODE
    }

    /// Renders the error and its causes for the terminal.
    ///
    /// With `RUST_BACKTRACE` set, the backtrace captured by a load error is appended.
    pub fn render_report(&self) -> String {
        let mut out = format!("error: {self}\n");

        // The message above already includes the direct source, and aggregated load errors
        // list every inner error themselves.
        let mut cause = match self {
            CliError::Load(err) if err.errors().is_some() => None,
            CliError::Load(err) => err.source(),
            CliError::Config(source) => source.source(),
            CliError::Io(source) => source.source(),
        };
        while let Some(err) = cause {
            out.push_str(&format!("caused by: {err}\n"));
            cause = err.source();
        }

        if let CliError::Load(err) = self
            && backtrace_enabled()
            && let Some(backtrace) = err.backtrace()
        {
            out.push_str(&format!("backtrace:\n{backtrace}\n"));
        }

        out
    }
}

fn backtrace_enabled() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Load(err) => write!(f, "{err}"),
            CliError::Config(source) => write!(f, "configuration error: {source}"),
            CliError::Io(source) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CliError::Load(err) => err.source(),
            CliError::Config(source) => Some(source.as_ref()),
            CliError::Io(source) => Some(source),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

impl From<LoadError> for CliError {
    fn from(err: LoadError) -> Self {
        CliError::Load(err)
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use loader::error::ErrorKind;

    #[test]
    fn report_shows_the_error_once() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = CliError::config(io_err);

        assert_eq!(
            err.render_report(),
            "error: configuration error: no such file\n"
        );
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn report_follows_nested_causes() {
        let result: anyhow::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "terminal closed",
        ))
        .context("failed to read the password from the terminal");
        let err = CliError::from(result.unwrap_err());

        assert_eq!(
            err.render_report(),
            "error: configuration error: failed to read the password from the terminal\n\
             caused by: terminal closed\n"
        );
    }

    #[test]
    fn aggregated_load_errors_are_not_repeated_as_causes() {
        let err = CliError::from(LoadError::from(vec![
            LoadError::from((ErrorKind::DestinationConnectionFailed, "Connection 1 failed")),
            LoadError::from((ErrorKind::DestinationConnectionFailed, "Connection 2 failed")),
        ]));

        let report = err.render_report();
        assert!(report.contains("[Many] 2 errors aggregated"));
        assert!(!report.contains("caused by:"));
    }
}
