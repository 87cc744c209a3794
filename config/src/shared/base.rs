use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The number of workers cannot be zero.
    #[error("`workers` cannot be zero")]
    WorkersZero,
    /// The target directory table name must be set.
    #[error("`table` must not be empty")]
    MissingTable,
    /// The input file, glob or directory must be set.
    #[error("`input` must not be empty")]
    MissingInput,
    /// A tag was supplied but it is empty.
    #[error("`tag` must not be empty when set")]
    EmptyTag,
    /// The heartbeat interval cannot be zero.
    #[error("`heartbeat_interval_ms` cannot be zero")]
    HeartbeatIntervalZero,
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
}
