// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::resources::Reservation;

/// Prereq wildcard: the job runs after every other job in the set.
pub const PREREQ_ALL: &str = "ALL";

/// Filter entry that matches any platform / compiler / method.
pub const FILTER_ALL: &str = "ALL";

/// Top-level suite file as read from TOML.
///
/// ```toml
/// [defaults]
/// max_time = 120
///
/// [[test]]
/// name = "build_mesh"
/// command = "mesh-tool --out mesh.e"
///
/// [[test]]
/// name = "solve"
/// command = "solver -i solve.i"
/// prereq = ["build_mesh"]
/// capabilities = "petsc>=3.18 & !slepc"
/// expect_out = "Solve Converged"
/// ```
///
/// Tests are an array of tables rather than a map so that duplicate names
/// survive deserialization and can be reported by validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    #[serde(default)]
    pub defaults: DefaultsSection,

    #[serde(default)]
    pub test: Vec<JobSpec>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsSection {
    /// Default `max_time` in seconds for jobs that do not set one.
    /// `--timeout` on the command line takes precedence.
    #[serde(default)]
    pub max_time: Option<f64>,
}

/// Immutable description of one test job.
///
/// Every recognised option is a field here; unknown keys are rejected at
/// load time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Unique job name.
    pub name: String,

    /// Shell command template. `{name}`, `{procs}` and `{threads}` are
    /// substituted before the job is dispatched.
    pub command: String,

    /// Wall-clock limit in seconds. `None` uses the run default.
    #[serde(default)]
    pub max_time: Option<f64>,

    /// Jobs that must be terminal before this one is dispatched.
    /// `["ALL"]` means every other job.
    #[serde(default)]
    pub prereq: Vec<String>,

    /// Capability expression, e.g. `"petsc>=3.18 & !slepc"`.
    #[serde(default)]
    pub capabilities: Option<String>,

    /// Explicit skip with a reason.
    #[serde(default)]
    pub skip: Option<String>,

    /// Permanently skipped; hidden from the report unless extra info is on.
    #[serde(default)]
    pub deleted: Option<String>,

    /// Group tags used by `--group` / `--not-group`.
    #[serde(default)]
    pub group: Vec<String>,

    /// Platforms this job runs on (`"ALL"`, `"LINUX"`, `"!DARWIN"`, ...).
    #[serde(default = "default_filter")]
    pub platform: Vec<String>,

    #[serde(default = "default_filter")]
    pub compiler: Vec<String>,

    /// Build methods (`"opt"`, `"dbg"`, `"devel"`, ...).
    #[serde(default = "default_filter")]
    pub method: Vec<String>,

    #[serde(default = "default_min_parallel")]
    pub min_parallel: u32,

    #[serde(default = "default_max_parallel")]
    pub max_parallel: u32,

    #[serde(default = "default_min_threads")]
    pub min_threads: u32,

    #[serde(default = "default_max_threads")]
    pub max_threads: u32,

    /// Only runs with `--heavy` / `--all-tests`; dispatched after light jobs.
    #[serde(default)]
    pub heavy: bool,

    /// Extra attempts after a `Fail`/`Timeout` when `--recover` is on.
    #[serde(default)]
    pub retries: u32,

    /// Whether `--recover` may retry this job at all.
    #[serde(default = "default_true")]
    pub recover: bool,

    /// Run once prereqs are terminal even if some of them did not succeed.
    #[serde(default)]
    pub ignore_prereq_failure: bool,

    /// Directory the command runs in (relative paths resolve against the
    /// suite file's directory).
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Extra environment variables for the process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Evaluators applied in order. Empty means "derive from the other
    /// fields", see [`JobSpec::effective_evaluators`].
    #[serde(default)]
    pub evaluators: Vec<String>,

    #[serde(default)]
    pub expect_exit_code: i32,

    /// Regex (or literal, see `match_literal`) that must occur in the output.
    #[serde(default)]
    pub expect_out: Option<String>,

    /// Regex (or literal) that must not occur in the output.
    #[serde(default)]
    pub absent_out: Option<String>,

    #[serde(default)]
    pub match_literal: bool,

    /// Files that must exist after the run.
    #[serde(default)]
    pub expect_files: Vec<PathBuf>,

    /// Files that must not exist after the run.
    #[serde(default)]
    pub forbid_files: Vec<PathBuf>,

    /// Environment variables that must be set for the job to run.
    #[serde(default)]
    pub env_vars: Vec<String>,

    /// Environment variables that must not be set for the job to run.
    #[serde(default)]
    pub env_vars_not_set: Vec<String>,

    /// Programs that must be on `PATH`.
    #[serde(default)]
    pub requires: Vec<String>,
}

fn default_filter() -> Vec<String> {
    vec![FILTER_ALL.to_string()]
}

fn default_min_parallel() -> u32 {
    1
}

fn default_max_parallel() -> u32 {
    1000
}

fn default_min_threads() -> u32 {
    1
}

fn default_max_threads() -> u32 {
    16
}

fn default_true() -> bool {
    true
}

impl JobSpec {
    /// A spec with every optional field at its default.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            max_time: None,
            prereq: Vec::new(),
            capabilities: None,
            skip: None,
            deleted: None,
            group: Vec::new(),
            platform: default_filter(),
            compiler: default_filter(),
            method: default_filter(),
            min_parallel: default_min_parallel(),
            max_parallel: default_max_parallel(),
            min_threads: default_min_threads(),
            max_threads: default_max_threads(),
            heavy: false,
            retries: 0,
            recover: true,
            ignore_prereq_failure: false,
            working_directory: None,
            env: BTreeMap::new(),
            evaluators: Vec::new(),
            expect_exit_code: 0,
            expect_out: None,
            absent_out: None,
            match_literal: false,
            expect_files: Vec::new(),
            forbid_files: Vec::new(),
            env_vars: Vec::new(),
            env_vars_not_set: Vec::new(),
            requires: Vec::new(),
        }
    }

    /// Effective wall-clock limit given the run default.
    ///
    /// A limit too large for a `Duration` saturates to `Duration::MAX`.
    pub fn max_time_or(&self, default: Duration) -> Duration {
        match self.max_time {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            }
            _ => default,
        }
    }

    /// Whether the prereq list is the `ALL` wildcard.
    pub fn depends_on_all(&self) -> bool {
        self.prereq.iter().any(|p| p == PREREQ_ALL)
    }

    /// Evaluator names to apply, in order.
    ///
    /// An explicit `evaluators` list wins. Otherwise `exit_code` always
    /// applies, `pattern` is added when `expect_out`/`absent_out` is set and
    /// `existence` when `expect_files`/`forbid_files` is set.
    pub fn effective_evaluators(&self) -> Vec<String> {
        if !self.evaluators.is_empty() {
            return self.evaluators.clone();
        }

        let mut names = vec![crate::evaluate::EXIT_CODE.to_string()];
        if self.expect_out.is_some() || self.absent_out.is_some() {
            names.push(crate::evaluate::PATTERN.to_string());
        }
        if !self.expect_files.is_empty() || !self.forbid_files.is_empty() {
            names.push(crate::evaluate::EXISTENCE.to_string());
        }
        names
    }

    /// Resolve the slot reservation for this job from the run's requested
    /// process and thread counts, clamped to the spec's bounds.
    pub fn reservation(&self, run_procs: u32, run_threads: u32) -> Reservation {
        let procs = run_procs.max(self.min_parallel).min(self.max_parallel).max(1);
        let threads = run_threads
            .max(self.min_threads)
            .min(self.max_threads)
            .max(1);
        Reservation {
            procs,
            threads_per_proc: threads,
        }
    }
}
