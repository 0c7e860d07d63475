// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `crontabd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "crontabd",
    version,
    about = "Job execution agent: scheduled pipelines, daemons and dependency hand-off.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the agent config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Crontabd.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CRONTABD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the agent settings and seeded jobs, then exit.
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
