//! Run the watch engine for parsed arguments

use crate::args::{Args, Backend};
use crate::handler;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};
use watchit_core::WatchConfig;
use watchit_watcher::{NotifySource, PollSource, RawSource, WatchEngine};

/// Watch until interrupted
pub async fn run(args: Args) -> Result<()> {
    let config = args.to_config().context("invalid watch configuration")?;
    debug!("Watch configuration: {:?}", config);

    match args.backend {
        Backend::Poll => watch(config, PollSource::new(), args.poll_interval()).await,
        Backend::Notify => {
            let source = NotifySource::new().context("failed to initialize native watcher")?;
            watch(config, source, args.poll_interval()).await
        }
    }
}

async fn watch<S: RawSource + 'static>(
    config: WatchConfig,
    source: S,
    interval: Option<Duration>,
) -> Result<()> {
    info!(
        "Watching {} (recursive: {}, pattern: {})",
        config
            .dirs()
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        config.recursive(),
        config.pattern()
    );
    // Commands ride along in the configuration; nothing runs them yet
    debug!("Configured commands: {:?}", config.cmds());

    let mut engine = WatchEngine::new(config, source, handler::print_event);
    if let Some(interval) = interval {
        engine = engine.with_poll_interval(interval);
    }
    engine.setup().context("setting up watch failed")?;

    let closer = engine.close_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping watch");
            closer.close();
        }
    });

    tokio::task::spawn_blocking(move || engine.start())
        .await
        .context("watch task failed")?
        .context("starting watch failed")?;

    Ok(())
}
