//! Error types for raw sources and the watch engine

use crate::engine::EngineState;
use std::path::PathBuf;
use thiserror::Error;
use watchit_core::ConfigError;

/// Errors reported by a raw event source
///
/// Returned from registration and `start`, and sent on the error channel
/// while a source is running.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watched path removed: {}", .0.display())]
    WatchedPathRemoved(PathBuf),

    #[error("no directories or files to watch")]
    NoWatchTargets,

    #[error("polling interval must be greater than zero")]
    IntervalTooShort,

    #[error("source is already running")]
    AlreadyRunning,

    #[error("source has been closed")]
    Closed,

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Errors from `WatchEngine::setup`
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("couldn't compile regex: {pattern}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: ConfigError,
    },

    #[error("failed to watch dir: {} (recursive: {recursive})", .dir.display())]
    WatchDir {
        dir: PathBuf,
        recursive: bool,
        #[source]
        source: SourceError,
    },

    #[error("setup needs an unconfigured engine, engine is {0:?}")]
    InvalidState(EngineState),
}

/// Errors from `WatchEngine::start`
#[derive(Error, Debug)]
pub enum StartError {
    #[error("failed to start watching files")]
    Source(#[from] SourceError),

    #[error("start needs a configured engine, engine is {0:?}")]
    NotConfigured(EngineState),

    #[error("failed to spawn dispatch thread")]
    Spawn(#[source] std::io::Error),
}
