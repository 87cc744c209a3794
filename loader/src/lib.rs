//! Parallel bulk loading of local files into a directory table.
//!
//! Tasks produced by [`source::collect_tasks`] are partitioned across a fixed number of
//! workers, each owning one [`destination::Destination`]. The [`workers::pool::WorkManager`]
//! supervises them, and [`driver::drive`] runs the pool until completion, fatal error or an
//! external interrupt.

pub mod concurrency;
pub mod destination;
pub mod driver;
pub mod error;
mod macros;
pub mod source;
pub mod task;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod workers;
