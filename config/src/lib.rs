//! Configuration for the `dirtableload` workspace.
//!
//! Settings are resolved in layers: built-in defaults (partly taken from the libpq
//! environment, see [`pgenv`]), an optional configuration file, `DIRTABLELOAD_`-prefixed
//! environment variables and finally explicit command line overrides. Passwords that are
//! still missing after that are looked up in the libpq password file, see [`pgpass`].

mod load;
pub mod pgenv;
pub mod pgpass;
pub mod shared;

pub use load::{LoadConfigError, SettingsOverrides, load_settings};
