// src/dag/job.rs

//! Per-run job state and the dispatch description handed to workers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::model::JobSpec;
use crate::dag::status::Status;
use crate::resources::Reservation;

/// Environment variable carrying the job name.
pub const ENV_JOB: &str = "TESTDAG_JOB";
/// Environment variable carrying the resolved process count.
pub const ENV_PROCS: &str = "TESTDAG_PROCS";
/// Environment variable carrying the resolved threads per process.
pub const ENV_THREADS: &str = "TESTDAG_THREADS";

/// Mutable state of one job for the current run.
///
/// Owned by the scheduler; nothing else writes it.
#[derive(Debug, Clone)]
pub struct Job {
    pub spec: Arc<JobSpec>,
    status: Status,
    pub reservation: Reservation,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub elapsed: Duration,
    pub output: String,
    pub attempts: u32,
    pub message: Option<String>,
    /// Hidden from the report unless extra info is requested.
    pub silent: bool,
    /// Left out by selection or deletion; its skip does not cascade.
    pub excluded: bool,
}

impl Job {
    pub fn new(spec: Arc<JobSpec>, reservation: Reservation) -> Self {
        Self {
            spec,
            status: Status::Pending,
            reservation,
            started_at: None,
            finished_at: None,
            elapsed: Duration::ZERO,
            output: String::new(),
            attempts: 0,
            message: None,
            silent: false,
            excluded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Move to `next`. Refuses (and logs) any move out of a terminal state
    /// or backwards; returns whether the transition happened.
    pub fn transition(&mut self, next: Status) -> bool {
        if self.status.is_terminal() {
            warn!(
                job = %self.spec.name,
                from = %self.status,
                to = %next,
                "refusing transition out of terminal state"
            );
            return false;
        }
        if next.rank() < self.status.rank() {
            warn!(
                job = %self.spec.name,
                from = %self.status,
                to = %next,
                "refusing backwards transition"
            );
            return false;
        }

        debug!(job = %self.spec.name, from = %self.status, to = %next, "status change");
        if next.is_terminal() {
            self.finished_at = Some(Instant::now());
        }
        self.status = next;
        true
    }
}

/// Everything a worker needs to run one job.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub name: String,
    pub spec: Arc<JobSpec>,
    /// Command with `{name}`, `{procs}` and `{threads}` substituted.
    pub command: String,
    pub reservation: Reservation,
    pub max_time: Duration,
    /// Complete extra environment for the process.
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// Total attempts allowed (1 unless retries are enabled).
    pub max_attempts: u32,
    pub heavy: bool,
}

impl ScheduledJob {
    pub fn from_job(job: &Job, default_max_time: Duration, retries_enabled: bool) -> Self {
        let spec = Arc::clone(&job.spec);
        let reservation = job.reservation;

        let command = spec
            .command
            .replace("{name}", &spec.name)
            .replace("{procs}", &reservation.procs.to_string())
            .replace("{threads}", &reservation.threads_per_proc.to_string());

        let mut env = BTreeMap::new();
        env.insert(ENV_JOB.to_string(), spec.name.clone());
        env.insert(ENV_PROCS.to_string(), reservation.procs.to_string());
        env.insert(
            ENV_THREADS.to_string(),
            reservation.threads_per_proc.to_string(),
        );
        env.insert(
            "OMP_NUM_THREADS".to_string(),
            reservation.threads_per_proc.to_string(),
        );
        env.extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let max_attempts = if retries_enabled && spec.recover {
            spec.retries.saturating_add(1)
        } else {
            1
        };

        Self {
            name: spec.name.clone(),
            command,
            reservation,
            max_time: spec.max_time_or(default_max_time),
            env,
            working_dir: spec.working_directory.clone(),
            max_attempts,
            heavy: spec.heavy,
            spec,
        }
    }
}
