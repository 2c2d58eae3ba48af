//! watchit - watch directories and report changed files

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use watchit_cli::args::Args;
use watchit_cli::watch;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries one line per change
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    watch::run(args).await
}
