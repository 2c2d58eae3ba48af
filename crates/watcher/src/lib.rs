//! Directory watching for watchit
//!
//! This crate turns raw filesystem activity into handler calls:
//! - A raw event source abstraction with poll-based and native backends
//! - Translation of raw operation codes into the core vocabulary
//! - Operation whitelist, name-pattern hook and per-cycle event cap
//! - The watch engine and its dispatch loop

pub mod engine;
pub mod error;
pub mod native;
pub mod poll;
pub mod source;
pub mod translate;

pub use engine::{EngineState, Handler, WatchEngine, DEFAULT_POLL_INTERVAL, MAX_EVENTS_PER_CYCLE};
pub use error::{SetupError, SourceError, StartError};
pub use native::NotifySource;
pub use poll::PollSource;
pub use source::{regex_filter_hook, CloseHandle, FilterHook, RawEvent, RawOp, RawSource, SourceChannels};
pub use translate::translate;
pub use watchit_core::Operation;
