pub mod base;
pub mod file;
pub mod pool;
