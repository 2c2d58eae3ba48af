//! Command-line arguments

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use watchit_core::{extension_pattern, ConfigError, WatchConfig};

/// Watch directories for changes and run commands on changed files.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "watchit")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directories to watch
    #[arg(short = 'd', long = "dirs", value_name = "DIR", required = true)]
    pub dirs: Vec<PathBuf>,

    /// Commands to run on changed files
    #[arg(short = 'c', long = "cmds", value_name = "CMD", required = true)]
    pub cmds: Vec<String>,

    /// Watch only files with these extensions
    #[arg(short = 'e', long = "ext", value_name = "EXT", default_value = "md")]
    pub exts: Vec<String>,

    /// Watch directories recursively
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// How filesystem changes are detected
    #[arg(long, value_enum, default_value_t = Backend::Poll)]
    pub backend: Backend,

    /// Polling interval in milliseconds
    #[arg(long = "poll-interval", value_name = "MS", hide = true)]
    pub poll_interval_ms: Option<u64>,
}

/// Raw event source behind the engine
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Scan watched directories every few seconds
    Poll,
    /// Use the operating system's change notifications
    Notify,
}

impl Args {
    /// File name pattern built from the extensions
    pub fn pattern(&self) -> String {
        extension_pattern(self.exts.as_slice())
    }

    /// Interval override; `None` keeps the engine default
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn to_config(&self) -> Result<WatchConfig, ConfigError> {
        WatchConfig::from_extensions(
            self.dirs.iter().cloned(),
            self.cmds.iter().cloned(),
            self.exts.as_slice(),
            self.recursive,
        )
    }
}
