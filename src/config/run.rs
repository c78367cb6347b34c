// src/config/run.rs

//! Run-level settings: everything that is not part of an individual job.

use std::thread;
use std::time::Duration;

use clap::ValueEnum;
use regex::Regex;

use crate::capability::Capabilities;
use crate::cli::CliArgs;
use crate::config::model::DefaultsSection;
use crate::errors::{HarnessError, Result};

/// `max_time` used when neither the job, the suite nor `--timeout` sets one.
pub const DEFAULT_MAX_TIME: Duration = Duration::from_secs(300);

/// Default for `--max-fails`.
pub const DEFAULT_MAX_FAILS: usize = 50;

/// Default for `--max-output-bytes`.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000;

/// What happens to jobs that are already running when the run halts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum HaltMode {
    /// Kill running jobs immediately.
    #[default]
    Kill,
    /// Let running jobs finish; only stop dispatching.
    Drain,
}

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Process slot capacity.
    pub max_parallel: u32,
    /// Thread slot capacity.
    pub max_threads: u32,
    /// Worker tasks pulling jobs. Clamped to `1..=max_parallel` by
    /// [`RunConfig::worker_count`].
    pub workers: usize,
    pub default_max_time: Duration,
    /// Requested processes per job, before clamping to each job's bounds.
    pub procs: u32,
    /// Requested threads per process, before clamping.
    pub nthreads: u32,

    pub name_filter: Option<Regex>,
    pub group: Option<String>,
    pub not_group: Option<String>,
    pub heavy: bool,
    pub all_tests: bool,

    pub recover: bool,
    pub dry_run: bool,
    pub halt_on_error: bool,
    pub halt_mode: HaltMode,
    /// Stop dispatching once this many jobs failed. 0 disables the limit.
    pub max_fails: usize,
    /// 0 keeps all output.
    pub max_output_bytes: usize,

    pub capabilities: Capabilities,
    pub platform: String,
    pub compiler: Option<String>,
    pub method: String,

    pub verbose: bool,
    pub timing: bool,
    pub extra_info: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let slots = u32::try_from(cpus).unwrap_or(u32::MAX);

        Self {
            max_parallel: slots,
            max_threads: slots,
            workers: cpus,
            default_max_time: DEFAULT_MAX_TIME,
            procs: 1,
            nthreads: 1,
            name_filter: None,
            group: None,
            not_group: None,
            heavy: false,
            all_tests: false,
            recover: false,
            dry_run: false,
            halt_on_error: false,
            halt_mode: HaltMode::Kill,
            max_fails: DEFAULT_MAX_FAILS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            capabilities: Capabilities::new(),
            platform: host_platform(),
            compiler: None,
            method: "opt".to_string(),
            verbose: false,
            timing: false,
            extra_info: false,
        }
    }
}

impl RunConfig {
    /// Build from CLI arguments and the suite's `[defaults]` section.
    ///
    /// `--timeout` wins over the suite default, which wins over
    /// [`DEFAULT_MAX_TIME`].
    pub fn from_args(args: &CliArgs, defaults: &DefaultsSection) -> Result<Self> {
        let base = RunConfig::default();

        let max_parallel = args.max_parallel.unwrap_or(base.max_parallel);
        let max_threads = args.max_threads.unwrap_or(base.max_threads);
        if max_parallel == 0 {
            return Err(HarnessError::ConfigError(
                "--max-parallel must be >= 1".to_string(),
            ));
        }
        if max_threads == 0 {
            return Err(HarnessError::ConfigError(
                "--max-threads must be >= 1".to_string(),
            ));
        }

        let default_max_time = match args.timeout.or(defaults.max_time) {
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::try_from_secs_f64(secs)
                .map_err(|_| {
                    HarnessError::ConfigError(format!("timeout of {secs} seconds is too large"))
                })?,
            Some(secs) => {
                return Err(HarnessError::ConfigError(format!(
                    "timeout must be a positive number of seconds (got {secs})"
                )));
            }
            None => DEFAULT_MAX_TIME,
        };

        let name_filter = args
            .reg_exp
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| HarnessError::ConfigError(format!("invalid --re pattern: {e}")))?;

        let capabilities = Capabilities::from_assignments(&args.capabilities)
            .map_err(HarnessError::ConfigError)?;

        Ok(Self {
            max_parallel,
            max_threads,
            workers: args.jobs.unwrap_or(max_parallel as usize),
            default_max_time,
            procs: args.procs.max(1),
            nthreads: args.n_threads.max(1),
            name_filter,
            group: args.group.clone(),
            not_group: args.not_group.clone(),
            heavy: args.heavy,
            all_tests: args.all_tests,
            recover: args.recover,
            dry_run: args.dry_run,
            halt_on_error: args.halt_on_error,
            halt_mode: args.halt_mode,
            max_fails: args.max_fails,
            max_output_bytes: args.max_output_bytes,
            capabilities,
            platform: args.platform.clone().unwrap_or(base.platform),
            compiler: args.compiler.clone(),
            method: args.method.clone(),
            verbose: args.verbose,
            timing: args.timing,
            extra_info: args.extra_info,
        })
    }

    /// Workers actually spawned: at least one, at most one per process slot.
    pub fn worker_count(&self) -> usize {
        self.workers.clamp(1, (self.max_parallel as usize).max(1))
    }
}

/// Host platform name as used by `platform` filters (`LINUX`, `DARWIN`, ...).
pub fn host_platform() -> String {
    match std::env::consts::OS {
        "macos" => "DARWIN".to_string(),
        other => other.to_ascii_uppercase(),
    }
}
