//! Parkwatch - parking gate entry/exit tracker.
//!
//! A camera frame is captured and turned into a plate string by external
//! programs; the plate then opens or closes a parking session in the ledger.
//!
//! Architecture:
//! - `ledger` owns slot allocation and the session lifecycle
//! - `store` keeps the ledger in a CSV file (the source of truth)
//! - `mirror` replicates committed changes to a remote key-value store
//! - `provider` runs the capture and recognition programs
//! - `controller` is the interactive gate console

mod cli;
mod config;
mod controller;
mod ledger;
mod mirror;
mod models;
mod provider;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli).await
}

/// Log to stderr so console output on stdout stays clean. `RUST_LOG` wins
/// over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
}
