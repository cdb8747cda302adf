// Rust guideline compliant 2026-07-29

//! Flowsentry entry point.
//!
//! Wires the CLI and configuration into the supervisor and runs the
//! pipeline to completion.
//!
//! # Usage
//!
//! ```text
//! # Read a binetflow file with defaults
//! flowsentry -f dataset/test2.binetflow -o out/
//!
//! # Read zeek json conn lines from stdin
//! cat conn.log | flowsentry -f stdin --line-type zeek
//!
//! # Inner logging of the workers themselves
//! RUST_LOG=debug flowsentry -f eve.json
//! ```

mod adapters;
mod cli;
mod config;
mod metadata;
mod modules;
mod supervisor;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize the log facade before any async work.
    env_logger::init();

    let cli = cli::Cli::parse();
    println!("flowsentry {}", env!("CARGO_PKG_VERSION"));

    let raw = config::RawConfig::load(cli.config.as_deref());
    let settings = config::Settings::resolve(&cli, &raw);

    let report = supervisor::run(settings)
        .await
        .context("supervisor failed")?;

    if report.failed_workers.is_empty() {
        log::info!(
            "main.complete: flows={} profiles={}",
            report.flows_processed,
            report.profiles
        );
    } else {
        // Worker failures are contained; they do not fail the process.
        log::warn!(
            "main.complete_with_failures: failed={}",
            report.failed_workers.len()
        );
    }
    Ok(())
}
