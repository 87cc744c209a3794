//! Helpers for tests of the loader and of crates building on it.
//!
//! - [`files`] writes numbered source files and returns the matching tasks.
//! - [`signal`] waits for pool signals with a timeout, so a test fails instead of hanging.

pub mod files;
pub mod signal;
