//! Watch engine
//!
//! Installs filters and watch targets on a raw source, then runs a
//! dispatch loop that hands each admitted event to the handler.
//!
//! ```text
//! WatchConfig ──► setup() ──► RawSource (ops whitelist, name hook, targets)
//!                                │ events / errors / closed
//!                                ▼
//!                 start() ──► dispatch loop ──► translate ──► Handler
//! ```

use crate::error::{SetupError, SourceError, StartError};
use crate::poll::PollSource;
use crate::source::{regex_filter_hook, CloseHandle, RawOp, RawSource, SourceChannels};
use crate::translate::translate;
use crossbeam_channel::select;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use watchit_core::{Operation, WatchConfig};

/// Polling interval used unless overridden
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Events delivered per polling cycle
///
/// Bursty writes collapse into a single notification per cycle.
pub const MAX_EVENTS_PER_CYCLE: usize = 1;

/// Callback invoked once per admitted event
pub type Handler = Box<dyn FnMut(Operation, &Path) + Send>;

/// Lifecycle of a [`WatchEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
    /// Setup or start failed; the engine is not retried
    Failed,
}

/// Directory watcher delivering filtered, normalized events to a handler
pub struct WatchEngine<S: RawSource = PollSource> {
    config: WatchConfig,
    source: S,
    handler: Handler,
    poll_interval: Duration,
    state: EngineState,
}

impl WatchEngine<PollSource> {
    /// Engine backed by a fresh [`PollSource`]
    pub fn polling(
        config: WatchConfig,
        handler: impl FnMut(Operation, &Path) + Send + 'static,
    ) -> Self {
        Self::new(config, PollSource::new(), handler)
    }
}

impl<S: RawSource> WatchEngine<S> {
    pub fn new(
        config: WatchConfig,
        source: S,
        handler: impl FnMut(Operation, &Path) + Send + 'static,
    ) -> Self {
        Self {
            config,
            source,
            handler: Box::new(handler),
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: EngineState::Unconfigured,
        }
    }

    /// Override the polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Handle that stops a running engine from another thread
    pub fn close_handle(&self) -> CloseHandle {
        self.source.closer()
    }

    /// Install filters and watch targets on the raw source
    ///
    /// The first directory that cannot be registered aborts setup.
    /// Directories registered before it stay registered.
    pub fn setup(&mut self) -> Result<(), SetupError> {
        if self.state != EngineState::Unconfigured {
            return Err(SetupError::InvalidState(self.state));
        }

        let result = self.install();
        self.state = match result {
            Ok(()) => EngineState::Configured,
            Err(_) => EngineState::Failed,
        };
        result
    }

    fn install(&self) -> Result<(), SetupError> {
        let source = &self.source;

        source.set_max_events(MAX_EVENTS_PER_CYCLE);

        // Only file content changes reach the handler
        source.filter_ops(&[RawOp::WRITE]);

        let re = self
            .config
            .regex()
            .map_err(|source| SetupError::InvalidPattern {
                pattern: self.config.pattern().to_string(),
                source,
            })?;
        source.add_filter_hook(regex_filter_hook(re, false));

        let recursive = self.config.recursive();
        for dir in self.config.dirs() {
            let added = if recursive {
                source.add_recursive(dir)
            } else {
                source.add(dir)
            };
            added.map_err(|source| SetupError::WatchDir {
                dir: dir.clone(),
                recursive,
                source,
            })?;
            debug!("Registered {} (recursive: {})", dir.display(), recursive);
        }

        info!(
            "Watch configured: {} dirs, pattern {}",
            self.config.dirs().len(),
            self.config.pattern()
        );
        Ok(())
    }

    /// Run the watch until the raw source is closed
    ///
    /// The dispatch loop is started before the source so no early event
    /// is missed. Blocks the calling thread; stop it with
    /// [`close_handle`](Self::close_handle).
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.state != EngineState::Configured {
            return Err(StartError::NotConfigured(self.state));
        }
        self.state = EngineState::Running;

        let channels = self.source.channels();
        let closer = self.source.closer();
        let source = &self.source;
        let handler = &mut self.handler;
        let interval = self.poll_interval;

        let result = thread::scope(|scope| {
            let dispatcher = thread::Builder::new()
                .name("watch-dispatch".to_string())
                .spawn_scoped(scope, move || {
                    let _guard = CloseOnDrop(closer);
                    dispatch(channels, handler);
                })
                .map_err(StartError::Spawn)?;

            let result = source.start(interval);

            if let Err(payload) = dispatcher.join() {
                std::panic::resume_unwind(payload);
            }
            result.map_err(StartError::from)
        });

        match &result {
            Ok(()) => {
                self.state = EngineState::Stopped;
                info!("Watch stopped; watched files: {:?}", self.source.watched_files());
            }
            Err(e) => {
                self.state = EngineState::Failed;
                warn!("Watch failed to start: {}", e);
            }
        }
        result
    }
}

/// Closes the source when the dispatch loop ends, even on panic
struct CloseOnDrop(CloseHandle);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Consume source signals until the source closes
fn dispatch(channels: SourceChannels, handler: &mut Handler) {
    let SourceChannels {
        events,
        errors,
        closed,
    } = channels;

    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(event) => {
                    let op = translate(event.op);
                    debug!("Dispatching {} {}", op, event.path.display());
                    handler(op, &event.path);
                }
                Err(_) => break,
            },
            recv(errors) -> msg => match msg {
                Ok(err) => report(&err),
                Err(_) => break,
            },
            recv(closed) -> _ => break,
        }
    }

    for err in errors.try_iter() {
        report(&err);
    }
    debug!("Dispatch loop exited");
}

fn report(err: &SourceError) {
    warn!("Watch error: {}", err);
}
