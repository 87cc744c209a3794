mod base;
mod connection;
mod settings;

pub use base::*;
pub use connection::*;
pub use settings::*;
