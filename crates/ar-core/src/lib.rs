pub mod artifacts;
pub mod config;
pub mod file_ops;
pub mod language;
