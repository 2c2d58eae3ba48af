//! Poll-based raw source
//!
//! Periodically re-lists every watch root and diffs the result against
//! the previous snapshot. Works on any platform and filesystem, at the
//! cost of only seeing changes once per cycle.

use crate::error::SourceError;
use crate::source::{
    CloseHandle, EventFilter, FilterHook, Lifecycle, RawEvent, RawOp, RawSource, Signals,
    SourceChannels,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace};
use walkdir::WalkDir;

/// What the scanner remembers about a path between cycles
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileInfo {
    is_dir: bool,
    len: u64,
    modified: Option<SystemTime>,
    mode: u32,
    id: Option<(u64, u64)>,
}

impl FileInfo {
    fn from_metadata(meta: &Metadata) -> Self {
        Self {
            is_dir: meta.is_dir(),
            len: meta.len(),
            modified: meta.modified().ok(),
            mode: permission_bits(meta),
            id: file_id(meta),
        }
    }

    fn content_changed(&self, other: &FileInfo) -> bool {
        self.modified != other.modified || self.len != other.len
    }
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> u32 {
    u32::from(meta.permissions().readonly())
}

#[cfg(unix)]
fn file_id(meta: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> Option<(u64, u64)> {
    None
}

struct PollState {
    /// Watch roots and whether each is recursive
    roots: BTreeMap<PathBuf, bool>,
    files: HashMap<PathBuf, FileInfo>,
    filter: EventFilter,
    ignored: HashSet<PathBuf>,
    ignore_hidden: bool,
    lifecycle: Lifecycle,
}

impl PollState {
    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignored.contains(path) {
            return true;
        }
        self.ignore_hidden
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(false)
    }

    /// Whether a listed entry belongs in the snapshot
    fn keeps(&self, path: &Path, info: &FileInfo) -> bool {
        !self.is_ignored(path) && (info.is_dir || self.filter.admits_path(path))
    }

    /// List one root into `out`
    fn list(
        &self,
        root: &Path,
        recursive: bool,
        out: &mut HashMap<PathBuf, FileInfo>,
        errors: &mut Vec<SourceError>,
    ) -> io::Result<()> {
        let meta = fs::metadata(root)?;
        out.insert(root.to_path_buf(), FileInfo::from_metadata(&meta));

        if !meta.is_dir() {
            return Ok(());
        }

        if recursive {
            let walker = WalkDir::new(root)
                .follow_links(false)
                .min_depth(1)
                .into_iter()
                .filter_entry(|e| !self.is_ignored(e.path()));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        errors.push(walk_error(root, e));
                        continue;
                    }
                };
                match entry.metadata() {
                    Ok(meta) => {
                        let info = FileInfo::from_metadata(&meta);
                        if self.keeps(entry.path(), &info) {
                            out.insert(entry.into_path(), info);
                        }
                    }
                    Err(e) => errors.push(walk_error(root, e)),
                }
            }
        } else {
            for entry in fs::read_dir(root)? {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(source) => {
                        errors.push(SourceError::Io {
                            path: root.to_path_buf(),
                            source,
                        });
                        continue;
                    }
                };
                let path = entry.path();
                match entry.metadata() {
                    Ok(meta) => {
                        let info = FileInfo::from_metadata(&meta);
                        if self.keeps(&path, &info) {
                            out.insert(path, info);
                        }
                    }
                    Err(source) => errors.push(SourceError::Io { path, source }),
                }
            }
        }

        Ok(())
    }

    /// Re-list every root, returning the new snapshot
    ///
    /// Roots that no longer exist are dropped and reported.
    fn scan(&mut self, errors: &mut Vec<SourceError>) -> HashMap<PathBuf, FileInfo> {
        let mut listed = HashMap::new();
        let mut removed_roots = Vec::new();

        for (root, &recursive) in &self.roots {
            if let Err(source) = self.list(root, recursive, &mut listed, errors) {
                if source.kind() == io::ErrorKind::NotFound {
                    removed_roots.push(root.clone());
                    errors.push(SourceError::WatchedPathRemoved(root.clone()));
                } else {
                    errors.push(SourceError::Io {
                        path: root.clone(),
                        source,
                    });
                }
            }
        }

        for root in removed_roots {
            self.roots.remove(&root);
        }

        listed
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> SourceError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
    SourceError::Io { path, source }
}

/// Compare two snapshots and describe what happened in between
///
/// Events come out grouped by kind (removes, renames and moves, creates,
/// writes, chmods) and sorted by path within each group.
fn diff(old: &HashMap<PathBuf, FileInfo>, new: &HashMap<PathBuf, FileInfo>) -> Vec<RawEvent> {
    let mut removed: BTreeMap<&PathBuf, &FileInfo> =
        old.iter().filter(|(p, _)| !new.contains_key(*p)).collect();
    let mut created: BTreeMap<&PathBuf, &FileInfo> =
        new.iter().filter(|(p, _)| !old.contains_key(*p)).collect();

    let mut renames = Vec::new();
    let removed_paths: Vec<&PathBuf> = removed.keys().copied().collect();
    for from in removed_paths {
        let Some(id) = removed[from].id else { continue };
        let Some(to) = created
            .iter()
            .find(|(_, info)| info.id == Some(id))
            .map(|(p, _)| *p)
        else {
            continue;
        };

        let op = if from.parent() == to.parent() {
            RawOp::RENAME
        } else {
            RawOp::MOVE
        };
        renames.push(RawEvent::renamed(op, from.clone(), to.clone()));
        removed.remove(from);
        created.remove(to);
    }

    let mut events: Vec<RawEvent> = removed
        .keys()
        .map(|p| RawEvent::new(RawOp::REMOVE, (*p).clone()))
        .collect();
    events.extend(renames);
    events.extend(created.keys().map(|p| RawEvent::new(RawOp::CREATE, (*p).clone())));

    let mut kept: Vec<(&PathBuf, &FileInfo, &FileInfo)> = new
        .iter()
        .filter_map(|(p, info)| old.get(p).map(|prev| (p, prev, info)))
        .collect();
    kept.sort_by(|a, b| a.0.cmp(b.0));

    events.extend(
        kept.iter()
            .filter(|(_, prev, info)| prev.content_changed(info))
            .map(|(p, _, _)| RawEvent::new(RawOp::WRITE, (*p).clone())),
    );
    events.extend(
        kept.iter()
            .filter(|(_, prev, info)| prev.mode != info.mode)
            .map(|(p, _, _)| RawEvent::new(RawOp::CHMOD, (*p).clone())),
    );

    events
}

/// Raw source that detects changes by polling
pub struct PollSource {
    state: Mutex<PollState>,
    signals: Signals,
}

impl PollSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PollState {
                roots: BTreeMap::new(),
                files: HashMap::new(),
                filter: EventFilter::default(),
                ignored: HashSet::new(),
                ignore_hidden: false,
                lifecycle: Lifecycle::Idle,
            }),
            signals: Signals::new(),
        }
    }

    /// Skip files and directories whose name starts with a dot
    pub fn ignore_hidden_files(&self, ignore: bool) {
        self.state.lock().ignore_hidden = ignore;
    }

    /// Exclude a path (and, for directories, everything below it)
    pub fn ignore(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.state.lock();
        state.files.retain(|p, _| !p.starts_with(&path));
        state.ignored.insert(path);
    }

    fn register(&self, path: &Path, recursive: bool) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        let mut listed = HashMap::new();
        let mut errors = Vec::new();

        state
            .list(path, recursive, &mut listed, &mut errors)
            .map_err(|source| SourceError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(
            "Watching {} ({} entries, recursive: {})",
            path.display(),
            listed.len(),
            recursive
        );

        state.files.extend(listed);
        state.roots.insert(path.to_path_buf(), recursive);
        drop(state);

        for err in errors {
            self.signals.report(err);
        }
        Ok(())
    }

    fn begin(&self, interval: Duration) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        let refused = match state.lifecycle {
            Lifecycle::Running => return Err(SourceError::AlreadyRunning),
            Lifecycle::Closed => Some(SourceError::Closed),
            Lifecycle::Idle if interval.is_zero() => Some(SourceError::IntervalTooShort),
            Lifecycle::Idle if state.roots.is_empty() => Some(SourceError::NoWatchTargets),
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

    /// Run one scan; returns false if closed while delivering
    fn cycle(&self) -> bool {
        let mut errors = Vec::new();
        let events = {
            let mut state = self.state.lock();
            let listed = state.scan(&mut errors);
            let events = diff(&state.files, &listed);
            state.files = listed;
            trace!("Poll cycle saw {} raw events", events.len());
            state.filter.apply(events)
        };

        for err in errors {
            self.signals.report(err);
        }
        self.signals.deliver(events)
    }
}

impl Default for PollSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSource for PollSource {
    fn set_max_events(&self, max: usize) {
        self.state.lock().filter.set_max_events(max);
    }

    fn filter_ops(&self, ops: &[RawOp]) {
        self.state.lock().filter.set_ops(ops);
    }

    fn add_filter_hook(&self, hook: FilterHook) {
        let mut state = self.state.lock();
        state.filter.add_hook(hook);
        // Files already listed must pass the new hook too
        let PollState { files, filter, .. } = &mut *state;
        files.retain(|path, info| info.is_dir || filter.admits_path(path));
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
        info!("Polling every {:?}", interval);

        while !self.signals.wait_close(interval) {
            if !self.cycle() {
                break;
            }
        }

        self.state.lock().lifecycle = Lifecycle::Closed;
        self.signals.signal_closed();
        info!("Polling stopped");
        Ok(())
    }

    fn watched_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.state.lock().files.keys().cloned().collect();
        files.sort();
        files
    }
}
