//! Coordination primitives shared by the pool supervisor, its workers and the run loop.
//!
//! - [`signal`] holds one-shot notifications: completion, fatal error and the internal
//!   shutdown-sync signal. Each fires at most once and raising it again is a no-op.
//! - [`shutdown`] holds the per-worker cancellation token. Workers only look at it between
//!   tasks, so an in-flight copy is never interrupted.

pub mod shutdown;
pub mod signal;
