//! Watch configuration
//!
//! A `WatchConfig` is built once from validated user input and never
//! changes afterwards.

use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from building a watch configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("at least one directory to watch is required")]
    NoDirectories,

    #[error("at least one command is required")]
    NoCommands,

    #[error("at least one file extension is required")]
    NoExtensions,

    #[error("invalid file name pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Build the file name pattern for a list of extensions
///
/// Matches any name ending in a dot followed by one of the extensions,
/// e.g. `["md", "txt"]` gives `.+\.(md|txt)$`.
pub fn extension_pattern<S: AsRef<str>>(exts: &[S]) -> String {
    let alternatives: Vec<&str> = exts.iter().map(AsRef::as_ref).collect();
    format!(r".+\.({})$", alternatives.join("|"))
}

/// What to watch and which file names to admit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    dirs: Vec<PathBuf>,
    cmds: Vec<String>,
    pattern: String,
    recursive: bool,
}

impl WatchConfig {
    /// Validate inputs and build a configuration
    ///
    /// Fails when `dirs` or `cmds` is empty or `pattern` does not compile.
    /// No filesystem access happens here.
    pub fn new<D, C>(
        dirs: impl IntoIterator<Item = D>,
        cmds: impl IntoIterator<Item = C>,
        pattern: impl Into<String>,
        recursive: bool,
    ) -> Result<Self, ConfigError>
    where
        D: Into<PathBuf>,
        C: Into<String>,
    {
        let dirs: Vec<PathBuf> = dirs.into_iter().map(Into::into).collect();
        if dirs.is_empty() {
            return Err(ConfigError::NoDirectories);
        }

        let cmds: Vec<String> = cmds.into_iter().map(Into::into).collect();
        if cmds.is_empty() {
            return Err(ConfigError::NoCommands);
        }

        let pattern = pattern.into();
        compile(&pattern)?;

        Ok(Self {
            dirs,
            cmds,
            pattern,
            recursive,
        })
    }

    /// Build a configuration whose pattern admits the given extensions
    pub fn from_extensions<D, C, S>(
        dirs: impl IntoIterator<Item = D>,
        cmds: impl IntoIterator<Item = C>,
        exts: &[S],
        recursive: bool,
    ) -> Result<Self, ConfigError>
    where
        D: Into<PathBuf>,
        C: Into<String>,
        S: AsRef<str>,
    {
        if exts.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        Self::new(dirs, cmds, extension_pattern(exts), recursive)
    }

    /// Directories to watch, in the order given
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Commands carried for the caller; never run by the watcher
    pub fn cmds(&self) -> &[String] {
        &self.cmds
    }

    /// Regular expression admitting file names
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether sub-directories are watched too
    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// Compile the name pattern
    pub fn regex(&self) -> Result<Regex, ConfigError> {
        compile(&self.pattern)
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
