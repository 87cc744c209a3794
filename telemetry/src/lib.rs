//! Logging setup shared by the `dirtableload` binary and the workspace tests.

pub mod tracing;
