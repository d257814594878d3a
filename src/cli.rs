// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::loader::default_workflow_path;

/// Command-line arguments for `awel`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "awel",
    version,
    about = "Run a DAG workflow described in a TOML file.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML).
    #[arg(
        long,
        short = 'w',
        value_name = "PATH",
        default_value_os_t = default_workflow_path()
    )]
    pub workflow: PathBuf,

    /// Node whose output is returned. Defaults to `[config].leaf`, or the
    /// only leaf of the graph.
    #[arg(long, value_name = "NAME")]
    pub leaf: Option<String>,

    /// Call data for the run, as JSON.
    #[arg(long, value_name = "JSON")]
    pub data: Option<String>,

    /// Expect a stream at the leaf and print one JSON value per line.
    #[arg(long)]
    pub stream: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `AWEL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
