// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! Workers talk to a `JobExecutor` instead of spawning processes directly.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production process runner in [`runner`](super::runner).

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::dag::ScheduledJob;
use crate::errors::LaunchError;

use super::runner::{run_job, RawResult};

/// Future returned by [`JobExecutor::run`].
pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Result<RawResult, LaunchError>> + Send + 'a>>;

/// Trait abstracting how one scheduled job is executed.
///
/// Production code uses [`ProcessExecutor`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait JobExecutor: Send + Sync {
    /// Run a single attempt of `job`.
    ///
    /// Implementations must honour `cancel` by stopping the job and
    /// returning a result with `cancelled = true`.
    fn run(&self, job: ScheduledJob, cancel: CancellationToken) -> JobFuture<'_>;
}

/// Executor that runs each job as a real OS process.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    max_output_bytes: usize,
}

impl ProcessExecutor {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl JobExecutor for ProcessExecutor {
    fn run(&self, job: ScheduledJob, cancel: CancellationToken) -> JobFuture<'_> {
        let max_output_bytes = self.max_output_bytes;
        Box::pin(async move { run_job(&job, cancel, max_output_bytes).await })
    }
}
