// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `greenpool`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "greenpool",
    version,
    about = "Run test targets concurrently in a pool of worker processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the test manifest (TOML).
    ///
    /// Default: `Greenpool.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Greenpool.toml")]
    pub config: String,

    /// Number of worker processes (overrides `[config].processes`).
    #[arg(long, short = 'p', value_name = "N")]
    pub processes: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GREENPOOL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the manifest, print the selected tests, run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Collect coverage for every run (overrides `[coverage].enabled`).
    #[arg(long)]
    pub coverage: bool,

    /// Also report test starts and skip reasons.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Targets to run: `module`, `module.class` or `module.class.method`.
    /// Defaults to every module in the manifest.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Run as a pool worker, speaking the line protocol on stdin/stdout.
    #[arg(long = "internal-worker", hide = true)]
    pub internal_worker: bool,

    /// JSON worker settings handed over by the pool.
    #[arg(long = "worker-spec", hide = true, value_name = "JSON")]
    pub worker_spec: Option<String>,
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

impl LogLevel {
    /// The flag value, for forwarding to worker processes.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
