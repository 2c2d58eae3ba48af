//! Native raw source backed by `notify`
//!
//! Uses the platform's notification API (inotify, FSEvents, ...). Native
//! events are gathered for one interval, de-duplicated, and then pushed
//! through the same whitelist, hook and cap as the poll scanner.

use crate::error::SourceError;
use crate::source::{
    CloseHandle, EventFilter, FilterHook, Lifecycle, RawEvent, RawOp, RawSource, Signals,
    SourceChannels,
};
use crossbeam_channel::{select, tick, unbounded, Receiver};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, trace};

struct NotifyState {
    /// Watch targets and whether each is recursive
    targets: BTreeMap<PathBuf, bool>,
    filter: EventFilter,
    lifecycle: Lifecycle,
}

/// Raw source fed by OS filesystem notifications
pub struct NotifySource {
    watcher: Mutex<RecommendedWatcher>,
    native_rx: Receiver<notify::Result<Event>>,
    state: Mutex<NotifyState>,
    signals: Signals,
}

impl NotifySource {
    pub fn new() -> Result<Self, SourceError> {
        let (native_tx, native_rx) = unbounded();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = native_tx.send(res);
        })?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            native_rx,
            state: Mutex::new(NotifyState {
                targets: BTreeMap::new(),
                filter: EventFilter::default(),
                lifecycle: Lifecycle::Idle,
            }),
            signals: Signals::new(),
        })
    }

    fn register(&self, path: &Path, recursive: bool) -> Result<(), SourceError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watcher.lock().watch(path, mode)?;
        self.state.lock().targets.insert(path.to_path_buf(), recursive);
        Ok(())
    }

    fn begin(&self, interval: Duration) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        let refused = match state.lifecycle {
            Lifecycle::Running => return Err(SourceError::AlreadyRunning),
            Lifecycle::Closed => Some(SourceError::Closed),
            Lifecycle::Idle if interval.is_zero() => Some(SourceError::IntervalTooShort),
            Lifecycle::Idle if state.targets.is_empty() => Some(SourceError::NoWatchTargets),
            Lifecycle::Idle => None,
        };

        match refused {
            Some(err) => {
                state.lifecycle = Lifecycle::Closed;
                drop(state);
                self.signals.signal_closed();
                Err(err)
            }
            None => {
                state.lifecycle = Lifecycle::Running;
                Ok(())
            }
        }
    }
}

/// Map a native event kind onto a raw operation code
fn raw_op(kind: &EventKind) -> Option<RawOp> {
    match kind {
        EventKind::Create(_) => Some(RawOp::CREATE),
        EventKind::Remove(_) => Some(RawOp::REMOVE),
        EventKind::Modify(ModifyKind::Name(_)) => Some(RawOp::RENAME),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(RawOp::CHMOD),
        EventKind::Modify(_) => Some(RawOp::WRITE),
        // Access and unclassified events carry no change
        _ => None,
    }
}

fn raw_events(event: Event) -> Vec<RawEvent> {
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        if let [from, to] = event.paths.as_slice() {
            let op = if from.parent() == to.parent() {
                RawOp::RENAME
            } else {
                RawOp::MOVE
            };
            return vec![RawEvent::renamed(op, from.clone(), to.clone())];
        }
    }

    match raw_op(&event.kind) {
        Some(op) => event
            .paths
            .into_iter()
            .map(|path| RawEvent::new(op, path))
            .collect(),
        None => Vec::new(),
    }
}

/// Add a native event to the current cycle, skipping repeats
fn collect(event: Event, pending: &mut Vec<RawEvent>) {
    for raw in raw_events(event) {
        if !pending.iter().any(|p| p.op == raw.op && p.path == raw.path) {
            pending.push(raw);
        }
    }
}

impl RawSource for NotifySource {
    fn set_max_events(&self, max: usize) {
        self.state.lock().filter.set_max_events(max);
    }

    fn filter_ops(&self, ops: &[RawOp]) {
        self.state.lock().filter.set_ops(ops);
    }

    fn add_filter_hook(&self, hook: FilterHook) {
        self.state.lock().filter.add_hook(hook);
    }

    fn add(&self, path: &Path) -> Result<(), SourceError> {
        self.register(path, false)
    }

    fn add_recursive(&self, path: &Path) -> Result<(), SourceError> {
        self.register(path, true)
    }

    fn channels(&self) -> SourceChannels {
        self.signals.channels()
    }

    fn closer(&self) -> CloseHandle {
        self.signals.closer()
    }

    fn start(&self, interval: Duration) -> Result<(), SourceError> {
        self.begin(interval)?;
        info!("Collecting native events every {:?}", interval);

        let ticker = tick(interval);
        let mut pending = Vec::new();

        loop {
            select! {
                recv(self.signals.close_requests()) -> _ => break,
                recv(self.native_rx) -> msg => match msg {
                    Ok(Ok(event)) => collect(event, &mut pending),
                    Ok(Err(err)) => self.signals.report(SourceError::Notify(err)),
                    Err(_) => break,
                },
                recv(ticker) -> _ => {
                    trace!("Native cycle saw {} raw events", pending.len());
                    let batch = self.state.lock().filter.apply(std::mem::take(&mut pending));
                    if !self.signals.deliver(batch) {
                        break;
                    }
                },
            }
        }

        self.state.lock().lifecycle = Lifecycle::Closed;
        self.signals.signal_closed();
        info!("Native watching stopped");
        Ok(())
    }

    fn watched_files(&self) -> Vec<PathBuf> {
        self.state.lock().targets.keys().cloned().collect()
    }
}
