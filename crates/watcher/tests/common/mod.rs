//! Common utilities for watch engine integration tests

use crossbeam_channel::{unbounded, Receiver};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use watchit_core::{Operation, WatchConfig};
use watchit_watcher::{CloseHandle, EngineState, StartError, WatchEngine};

/// Poll interval used by the scenarios
pub const TEST_INTERVAL: Duration = Duration::from_millis(50);

/// Scratch directory tree that is removed on drop
pub struct WatchFixture {
    pub temp_dir: TempDir,
}

impl WatchFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a directory (and parents) below the root
    pub fn create_dir(&self, rel: &str) -> PathBuf {
        let path = self.root().join(rel);
        fs::create_dir_all(&path).expect("failed to create dir");
        path
    }

    /// Create an empty file opened for appending
    pub fn create_file(&self, rel: &str) -> (PathBuf, File) {
        let path = self.root().join(rel);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .expect("failed to create file");
        (path, file)
    }

    pub fn md_config(&self, recursive: bool) -> WatchConfig {
        WatchConfig::from_extensions([self.root()], ["echo changed"], &["md"], recursive)
            .expect("valid config")
    }
}

/// Engine running on a background thread
pub struct RunningEngine {
    pub events: Receiver<(Operation, PathBuf)>,
    closer: CloseHandle,
    thread: JoinHandle<Result<EngineState, StartError>>,
}

impl RunningEngine {
    /// Set up and start a polling engine for `config`
    pub fn spawn(config: WatchConfig) -> Self {
        let (tx, events) = unbounded();
        let mut engine = WatchEngine::polling(config, move |op, path: &Path| {
            let _ = tx.send((op, path.to_path_buf()));
        })
        .with_poll_interval(TEST_INTERVAL);

        engine.setup().expect("setup failed");
        let closer = engine.close_handle();

        let thread = thread::spawn(move || {
            engine.start()?;
            Ok(engine.state())
        });

        Self {
            events,
            closer,
            thread,
        }
    }

    /// Close the source and wait for `start` to return
    pub fn stop(self) -> Result<EngineState, StartError> {
        self.closer.close();
        self.thread.join().expect("engine thread panicked")
    }
}

/// Keep appending to `file` until the engine reports something or time runs out
pub fn write_until_event(
    file: &mut File,
    events: &Receiver<(Operation, PathBuf)>,
    timeout: Duration,
) -> Option<(Operation, PathBuf)> {
    let deadline = Instant::now() + timeout;
    let mut line = 0;
    while Instant::now() < deadline {
        line += 1;
        writeln!(file, "line {line}").expect("write failed");
        file.flush().expect("flush failed");
        thread::sleep(Duration::from_millis(10));

        if let Ok(event) = events.recv_timeout(TEST_INTERVAL * 2) {
            return Some(event);
        }
    }
    None
}
