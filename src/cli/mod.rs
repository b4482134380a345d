//! Command-line interface definitions for the `converge` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `converge` binary.
#[derive(Debug, Parser)]
#[command(
    name = "converge",
    about = "Wait until a remote resource settles into a target state",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Poll a URL until its state reaches a target value.
    #[command(name = "http", about = "Poll a URL until its state reaches a target value")]
    Http(HttpCommand),
}

/// Arguments for the `converge http` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct HttpCommand {
    /// URL read on every refresh.
    #[arg(value_name = "URL")]
    pub(crate) url: String,
    /// State that means the resource is still transitioning. Repeatable.
    #[arg(long, value_name = "STATE")]
    pub(crate) pending: Vec<String>,
    /// State that ends the wait successfully. Repeatable.
    #[arg(long, value_name = "STATE", required = true)]
    pub(crate) target: Vec<String>,
    /// JSON pointer to a string state in the response body.
    ///
    /// Without a pointer the numeric status code is the state, and a 404 is
    /// reported as "404" so deletions can be confirmed with `--target 404`.
    #[arg(long, value_name = "POINTER")]
    pub(crate) state_pointer: Option<String>,
    /// Overall time budget in seconds (overrides configuration).
    #[arg(long, value_name = "SECONDS")]
    pub(crate) timeout: Option<u64>,
    /// Minimum seconds between two refreshes (overrides configuration).
    #[arg(long, value_name = "SECONDS")]
    pub(crate) min_interval: Option<u64>,
    /// Consecutive target observations required (overrides configuration).
    #[arg(long, value_name = "COUNT")]
    pub(crate) occurrences: Option<u32>,
    /// Seconds to wait before the first refresh (overrides configuration).
    #[arg(long, value_name = "SECONDS")]
    pub(crate) delay: Option<u64>,
    /// Consecutive not-found reads tolerated while pending (overrides
    /// configuration).
    #[arg(long, value_name = "COUNT")]
    pub(crate) not_found_checks: Option<u32>,
}
