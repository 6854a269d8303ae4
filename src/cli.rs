// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `jobcntrl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobcntrl",
    version,
    about = "Run configured jobs in response to starter activations.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `JobCntrl.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "JobCntrl.toml")]
    pub config: String,

    /// Append every starter completion as a JSON line to this file.
    #[arg(long, value_name = "PATH")]
    pub completion_log: Option<String>,

    /// Activate this starter once right after startup.
    #[arg(long, value_name = "NAME")]
    pub activate: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBCNTRL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the configured graph, but don't start.
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
