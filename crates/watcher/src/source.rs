//! Raw event source abstraction
//!
//! A raw source observes the filesystem and emits primitive
//! "operation + path" events. The engine only depends on the
//! [`RawSource`] trait so backends can be swapped or mocked.

use crate::error::SourceError;
use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Native operation code of a raw source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawOp(pub u32);

impl RawOp {
    pub const CREATE: RawOp = RawOp(0);
    pub const WRITE: RawOp = RawOp(1);
    pub const REMOVE: RawOp = RawOp(2);
    pub const RENAME: RawOp = RawOp(3);
    pub const CHMOD: RawOp = RawOp(4);
    /// Rename into a different directory
    pub const MOVE: RawOp = RawOp(5);
}

/// Primitive event emitted by a raw source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub op: RawOp,
    pub path: PathBuf,
    /// Previous path for renames and moves
    pub old_path: Option<PathBuf>,
}

impl RawEvent {
    pub fn new(op: RawOp, path: impl Into<PathBuf>) -> Self {
        Self {
            op,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn renamed(op: RawOp, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            op,
            path: to.into(),
            old_path: Some(from.into()),
        }
    }
}

/// Predicate deciding whether an event path is admitted
pub type FilterHook = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Build a hook admitting paths that match `re`
///
/// With `use_full_path` unset only the final path component is matched.
pub fn regex_filter_hook(re: Regex, use_full_path: bool) -> FilterHook {
    Box::new(move |path: &Path| {
        if use_full_path {
            return re.is_match(&path.to_string_lossy());
        }
        path.file_name()
            .map(|name| re.is_match(&name.to_string_lossy()))
            .unwrap_or(false)
    })
}

/// Receiving ends of a source's signal channels
#[derive(Debug, Clone)]
pub struct SourceChannels {
    pub events: Receiver<RawEvent>,
    pub errors: Receiver<SourceError>,
    /// Disconnects once the source has stopped
    pub closed: Receiver<()>,
}

/// Cloneable handle that stops a running source
///
/// Closing is idempotent and works before or during `start`.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Sender<()>,
}

impl CloseHandle {
    pub fn close(&self) {
        // A full channel means a close is already pending
        let _ = self.tx.try_send(());
    }
}

/// Filesystem event producer consumed by the watch engine
pub trait RawSource: Send {
    /// Cap the events delivered per polling cycle; 0 means unlimited
    fn set_max_events(&self, max: usize);

    /// Deliver only these operations; an empty list admits all
    fn filter_ops(&self, ops: &[RawOp]);

    /// Reject event paths for which the hook returns false
    fn add_filter_hook(&self, hook: FilterHook);

    /// Watch a directory (or single file) without descending
    fn add(&self, path: &Path) -> Result<(), SourceError>;

    /// Watch a directory and everything below it
    fn add_recursive(&self, path: &Path) -> Result<(), SourceError>;

    fn channels(&self) -> SourceChannels;

    fn closer(&self) -> CloseHandle;

    /// Run the source until it is closed
    ///
    /// Blocks the calling thread. The `closed` channel is signalled
    /// whenever this returns, unless the source was already running.
    fn start(&self, interval: Duration) -> Result<(), SourceError>;

    /// Currently watched paths, sorted
    fn watched_files(&self) -> Vec<PathBuf>;
}

/// Operation whitelist, name hooks and per-cycle cap shared by backends
#[derive(Default)]
pub(crate) struct EventFilter {
    ops: HashSet<RawOp>,
    hooks: Vec<FilterHook>,
    max_events: usize,
}

impl EventFilter {
    pub(crate) fn set_max_events(&mut self, max: usize) {
        self.max_events = max;
    }

    pub(crate) fn set_ops(&mut self, ops: &[RawOp]) {
        self.ops = ops.iter().copied().collect();
    }

    pub(crate) fn add_hook(&mut self, hook: FilterHook) {
        self.hooks.push(hook);
    }

    pub(crate) fn admits_path(&self, path: &Path) -> bool {
        self.hooks.iter().all(|hook| hook(path))
    }

    fn admits_op(&self, op: RawOp) -> bool {
        self.ops.is_empty() || self.ops.contains(&op)
    }

    /// Reduce one cycle's events to what may be delivered
    pub(crate) fn apply(&self, events: Vec<RawEvent>) -> Vec<RawEvent> {
        let mut admitted: Vec<RawEvent> = events
            .into_iter()
            .filter(|e| self.admits_op(e.op) && self.admits_path(&e.path))
            .collect();

        if self.max_events > 0 && admitted.len() > self.max_events {
            debug!(
                "Dropping {} events over the cycle limit of {}",
                admitted.len() - self.max_events,
                self.max_events
            );
            admitted.truncate(self.max_events);
        }

        admitted
    }
}

/// Where a source is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Idle,
    Running,
    Closed,
}

/// Channel plumbing shared by backends
pub(crate) struct Signals {
    event_tx: Sender<RawEvent>,
    event_rx: Receiver<RawEvent>,
    error_tx: Sender<SourceError>,
    error_rx: Receiver<SourceError>,
    closed_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
    close_tx: Sender<()>,
    close_rx: Receiver<()>,
}

impl Signals {
    pub(crate) fn new() -> Self {
        // Rendezvous: a source waits for the dispatcher to take each event
        let (event_tx, event_rx) = bounded(0);
        let (error_tx, error_rx) = unbounded();
        let (closed_tx, closed_rx) = bounded(1);
        let (close_tx, close_rx) = bounded(1);

        Self {
            event_tx,
            event_rx,
            error_tx,
            error_rx,
            closed_tx: Mutex::new(Some(closed_tx)),
            closed_rx,
            close_tx,
            close_rx,
        }
    }

    pub(crate) fn channels(&self) -> SourceChannels {
        SourceChannels {
            events: self.event_rx.clone(),
            errors: self.error_rx.clone(),
            closed: self.closed_rx.clone(),
        }
    }

    pub(crate) fn closer(&self) -> CloseHandle {
        CloseHandle {
            tx: self.close_tx.clone(),
        }
    }

    pub(crate) fn close_requests(&self) -> &Receiver<()> {
        &self.close_rx
    }

    /// Wait up to `timeout` for a close request
    pub(crate) fn wait_close(&self, timeout: Duration) -> bool {
        match self.close_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Hand events to the consumer one at a time
    ///
    /// Returns false if a close request arrived while waiting.
    pub(crate) fn deliver(&self, events: Vec<RawEvent>) -> bool {
        for event in events {
            select! {
                send(self.event_tx, event) -> res => {
                    if res.is_err() {
                        return false;
                    }
                }
                recv(self.close_rx) -> _ => return false,
            }
        }
        true
    }

    pub(crate) fn report(&self, err: SourceError) {
        let _ = self.error_tx.send(err);
    }

    /// Disconnect the `closed` channel for every receiver
    pub(crate) fn signal_closed(&self) {
        self.closed_tx.lock().take();
    }
}
