//! Core types for watchit
//!
//! This crate holds the pieces of the watcher that do no I/O:
//! - The normalized operation vocabulary handed to handlers
//! - The immutable watch configuration and its validation
//! - The file-extension pattern rule used by the command line

pub mod config;
pub mod op;

// Re-export main types for convenience
pub use config::{extension_pattern, ConfigError, WatchConfig};
pub use op::{operation_name, Operation};
