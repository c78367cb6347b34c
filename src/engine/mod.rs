// src/engine/mod.rs

//! Orchestration engine for testdag.
//!
//! This module ties together:
//! - the job scheduler (who runs next, what happens to dependents)
//! - the ready queue that worker tasks pull from
//! - the worker pool that acquires slots, runs and evaluates jobs
//! - the main runtime event loop that reacts to:
//!   - jobs starting and finishing
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`] and [`worker`].

use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::config::{HaltMode, RunConfig};
use crate::dag::Status;

/// Canonical job name type used throughout the engine.
pub type JobName = String;

/// Final outcome of a job as reported by its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: Status,
    pub message: Option<String>,
    pub output: String,
    /// Summed over all attempts.
    pub elapsed: Duration,
    pub attempts: u32,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// What a halt on error does to running jobs.
    pub halt_mode: HaltMode,
    /// Number of worker tasks.
    pub workers: usize,
}

impl RuntimeOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            halt_mode: config.halt_mode,
            workers: config.worker_count(),
        }
    }
}

/// Events flowing into the runtime from workers and signal handlers.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A worker holds the job's slots and asks to launch it. The runtime
    /// answers on `ack` whether the launch may go ahead.
    JobStarted {
        name: JobName,
        started_at: Instant,
        ack: Option<oneshot::Sender<bool>>,
    },
    /// A job finished (after all attempts).
    JobFinished { name: JobName, outcome: JobOutcome },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

impl RuntimeEvent {
    /// Detach the start acknowledgement so the event itself can go to the
    /// core.
    pub fn take_ack(&mut self) -> Option<oneshot::Sender<bool>> {
        match self {
            RuntimeEvent::JobStarted { ack, .. } => ack.take(),
            _ => None,
        }
    }
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod report;
pub mod runtime;
pub mod worker;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::ReadyQueue;
pub use report::{ReportEntry, RunReport, RenderOptions};
pub use runtime::Runtime;
