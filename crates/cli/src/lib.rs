//! Library side of the watchit binary
//!
//! Kept separate from `main.rs` so argument handling and the default
//! handler can be tested directly.

pub mod args;
pub mod handler;
pub mod watch;
