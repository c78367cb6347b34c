// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - pushing `ScheduledJob`s onto the ready queue
//! - cancelling workers and running processes
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use crate::config::RunConfig;
use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_job_finished, handle_job_started, handle_run_start, handle_shutdown, CoreStep,
};
use crate::engine::report::RunReport;
use crate::engine::{RuntimeEvent, RuntimeOptions};

/// Pure core runtime state.
///
/// This owns:
/// - the job scheduler
/// - runtime options (e.g. halt mode)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, options: RuntimeOptions) -> Self {
        Self { scheduler, options }
    }

    /// Build with options taken from the scheduler's run config.
    pub fn from_scheduler(scheduler: Scheduler) -> Self {
        let options = RuntimeOptions::from_config(scheduler.config());
        Self::new(scheduler, options)
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn config(&self) -> &RunConfig {
        self.scheduler.config()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Start the run and return the initial commands.
    pub fn start(&mut self) -> CoreStep {
        handle_run_start(&mut self.scheduler, &self.options)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::JobStarted { name, started_at, .. } => {
                handle_job_started(&mut self.scheduler, name, started_at)
            }
            RuntimeEvent::JobFinished { name, outcome } => {
                handle_job_finished(&mut self.scheduler, &self.options, name, outcome)
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.scheduler),
        }
    }

    pub fn report(&self) -> RunReport {
        self.scheduler.report()
    }
}
