// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::HaltMode;

/// Command-line arguments for `testdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "testdag",
    version,
    about = "Run a suite of test commands under prerequisite and resource constraints.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the suite file (TOML).
    #[arg(long, value_name = "PATH", default_value = "tests.toml")]
    pub suite: String,

    /// Size of the process slot pool. Defaults to the number of CPUs.
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<u32>,

    /// Size of the thread slot pool. Defaults to the number of CPUs.
    #[arg(long, value_name = "N")]
    pub max_threads: Option<u32>,

    /// Number of worker units pulling jobs. Bounded by `--max-parallel`.
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Default `max_time` in seconds for jobs that do not set one.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// MPI processes requested per job (clamped by each job's bounds).
    #[arg(short = 'p', long, value_name = "N", default_value_t = 1)]
    pub procs: u32,

    /// Threads per process requested per job (clamped by each job's bounds).
    #[arg(long = "n-threads", value_name = "N", default_value_t = 1)]
    pub n_threads: u32,

    /// Only run jobs whose name matches this regular expression.
    #[arg(long = "re", value_name = "PATTERN")]
    pub reg_exp: Option<String>,

    /// Only run jobs in this group.
    #[arg(short = 'g', long, value_name = "GROUP")]
    pub group: Option<String>,

    /// Only run jobs NOT in this group.
    #[arg(long, value_name = "GROUP")]
    pub not_group: Option<String>,

    /// Run only heavy jobs.
    #[arg(long)]
    pub heavy: bool,

    /// Run heavy and non-heavy jobs.
    #[arg(long)]
    pub all_tests: bool,

    /// Enable each job's configured retry policy.
    #[arg(long)]
    pub recover: bool,

    /// Validate the job graph and print the plan; run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop dispatching after the first failing job.
    #[arg(long)]
    pub halt_on_error: bool,

    /// What happens to running jobs when the run halts.
    #[arg(long, value_enum, value_name = "MODE", default_value_t = HaltMode::Kill)]
    pub halt_mode: HaltMode,

    /// Stop dispatching once this many jobs have failed.
    #[arg(long, value_name = "N", default_value_t = 50)]
    pub max_fails: usize,

    /// Captured output beyond this many bytes is trimmed (0 = keep all).
    #[arg(long, value_name = "BYTES", default_value_t = 100_000)]
    pub max_output_bytes: usize,

    /// Runtime capability, `name=value` or bare `name` (repeatable).
    #[arg(long = "capability", value_name = "NAME[=VALUE]")]
    pub capabilities: Vec<String>,

    /// Platform used by `platform` filters. Defaults to the host OS.
    #[arg(long, value_name = "NAME")]
    pub platform: Option<String>,

    /// Compiler used by `compiler` filters.
    #[arg(long, value_name = "NAME")]
    pub compiler: Option<String>,

    /// Build method used by `method` filters.
    #[arg(long, value_name = "NAME", default_value = "opt")]
    pub method: String,

    /// Print the captured output of failing jobs.
    #[arg(short, long)]
    pub verbose: bool,

    /// Report elapsed time for passing jobs too.
    #[arg(short, long)]
    pub timing: bool,

    /// Also report deleted and unselected jobs.
    #[arg(short = 'e', long)]
    pub extra_info: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TESTDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
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
