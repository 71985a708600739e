//! Command-line interface for music-mirror.
//!
//! Lookups print JSON on stdout; logs go to stderr.

mod commands;

pub use commands::{Cli, Commands, run_command};
