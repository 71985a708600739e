//! Music Mirror - command-line entry point.
//!
//! Looks up catalog entities through the local cache, preserves them,
//! manages linked users and runs the play-history synchronizer.

use clap::Parser;
use music_mirror::cli;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr; stdout carries JSON output
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("music_mirror=info".parse()?))
        .init();

    cli::run_command(args)
}
