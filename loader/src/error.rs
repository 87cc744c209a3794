//! Error types and result definitions for load operations.
//!
//! Provides an error system with classification, aggregation, and captured diagnostic
//! metadata. The [`LoadError`] type supports single errors, errors with additional detail,
//! and multiple aggregated errors, for example when several connections fail to open.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for load operations using [`LoadError`] as the error type.
pub type LoadResult<T> = Result<T, LoadError>;

/// Detailed payload stored for single [`LoadError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for load operations.
///
/// [`LoadError`] can represent a single error, optionally with detail and source, or
/// multiple aggregated errors.
#[derive(Debug, Clone)]
pub struct LoadError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    Many {
        errors: Vec<LoadError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during a load.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source Errors
    SourceOpenFailed,
    SourceReadFailed,

    // Destination Errors
    DestinationConnectionFailed,
    DestinationQueryFailed,
    DestinationTableMissing,
    DestinationFileExists,
    TransferFailed,

    // Security & Authentication Errors
    AuthenticationError,
    PermissionDenied,
    EncryptionError,

    // Input Errors
    InvalidInput,

    // IO Errors
    IoError,

    // Run Control Errors
    StopOnError,
    WorkerPanic,
    InvalidState,

    // Unknown / Uncategorized
    Unknown,
}

impl LoadError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the static description of this error.
    ///
    /// For multiple errors, returns the description of the first error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("multiple errors"),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, or [`None`] for a single error.
    pub fn errors(&self) -> Option<&[LoadError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// Has no effect when called on aggregated errors because aggregates forward the first
    /// contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    /// Replaces the kind of a single error, keeping everything else.
    ///
    /// Used where the call site knows better than the generic conversion what failed, for
    /// example an I/O error raised while opening a source file.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.kind = kind;
        }

        self
    }

    /// Creates a [`LoadError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        LoadError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            }),
        }
    }
}

impl PartialEq for LoadError {
    fn eq(&self, other: &LoadError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                write!(f, "[{:?}] {}", payload.kind, payload.description)?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_detail(detail, f)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, .. } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated",
                    count,
                    if count == 1 { "" } else { "s" },
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                } else {
                    for (index, error) in errors.iter().enumerate() {
                        let rendered = format!("{error}");
                        let mut lines = rendered.lines();
                        if let Some(first_line) = lines.next() {
                            write!(f, "\n  {}. {}", index + 1, first_line)?;
                        }

                        for line in lines {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for LoadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // For aggregated errors, we forward the first contained error as the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the detail block indented below the headline.
fn write_detail(detail: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if detail.trim().is_empty() {
        return write!(f, "\n  Detail: <empty>");
    }

    write!(f, "\n  Detail:")?;
    for line in detail.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

/// Creates a [`LoadError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for LoadError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> LoadError {
        LoadError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`LoadError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for LoadError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> LoadError {
        LoadError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`LoadError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly.
impl<E> From<Vec<E>> for LoadError
where
    E: Into<LoadError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> LoadError {
        let location = Location::caller();

        let mut errors: Vec<LoadError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        LoadError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`LoadError`] with the appropriate error kind.
impl From<std::io::Error> for LoadError {
    #[track_caller]
    fn from(err: std::io::Error) -> LoadError {
        let (kind, description) = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                (ErrorKind::PermissionDenied, "I/O permission denied")
            }
            _ => (ErrorKind::IoError, "I/O operation failed"),
        };

        let detail = err.to_string();
        LoadError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`tokio_postgres::Error`] to [`LoadError`] with the appropriate error kind.
///
/// Maps the SQLSTATE to a specific kind. Errors without SQLSTATE come from the client side
/// of the connection and are reported as connection failures.
impl From<tokio_postgres::Error> for LoadError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> LoadError {
        let (kind, description) = match err.code() {
            Some(sqlstate) => {
                use tokio_postgres::error::SqlState;

                match *sqlstate {
                    // Connection errors (08xxx) and server shutdown (57Pxx)
                    SqlState::CONNECTION_EXCEPTION
                    | SqlState::CONNECTION_DOES_NOT_EXIST
                    | SqlState::CONNECTION_FAILURE
                    | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                    | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
                    | SqlState::TOO_MANY_CONNECTIONS
                    | SqlState::ADMIN_SHUTDOWN
                    | SqlState::CRASH_SHUTDOWN
                    | SqlState::CANNOT_CONNECT_NOW => (
                        ErrorKind::DestinationConnectionFailed,
                        "Postgres connection failed",
                    ),

                    // Authentication errors (28xxx)
                    SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                        ErrorKind::AuthenticationError,
                        "Postgres authentication failed",
                    ),

                    SqlState::INSUFFICIENT_PRIVILEGE => {
                        (ErrorKind::PermissionDenied, "Postgres permission denied")
                    }

                    SqlState::UNDEFINED_TABLE => (
                        ErrorKind::DestinationTableMissing,
                        "Directory table does not exist",
                    ),

                    // A file with the same relative path is already stored in the table.
                    SqlState::UNIQUE_VIOLATION => (
                        ErrorKind::DestinationFileExists,
                        "File already exists in directory table",
                    ),

                    SqlState::QUERY_CANCELED | SqlState::IO_ERROR | SqlState::DISK_FULL => {
                        (ErrorKind::TransferFailed, "Bulk copy was aborted by the server")
                    }

                    _ => (ErrorKind::DestinationQueryFailed, "Postgres query failed"),
                }
            }
            None => (
                ErrorKind::DestinationConnectionFailed,
                "Postgres connection failed",
            ),
        };

        let detail = err.to_string();
        LoadError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`rustls::Error`] to [`LoadError`] with [`ErrorKind::EncryptionError`].
impl From<rustls::Error> for LoadError {
    #[track_caller]
    fn from(err: rustls::Error) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::EncryptionError,
            Cow::Borrowed("TLS configuration failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`walkdir::Error`] to [`LoadError`] with [`ErrorKind::InvalidInput`].
impl From<walkdir::Error> for LoadError {
    #[track_caller]
    fn from(err: walkdir::Error) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::InvalidInput,
            Cow::Borrowed("Failed to enumerate input files"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`globset::Error`] to [`LoadError`] with [`ErrorKind::InvalidInput`].
impl From<globset::Error> for LoadError {
    #[track_caller]
    fn from(err: globset::Error) -> LoadError {
        let detail = err.to_string();
        LoadError::from_components(
            ErrorKind::InvalidInput,
            Cow::Borrowed("Invalid glob pattern"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
