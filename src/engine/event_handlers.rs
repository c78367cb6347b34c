// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Instant;

use tracing::info;

use crate::config::HaltMode;
use crate::dag::status::RUN_CANCELLED;
use crate::dag::{ScheduledJob, Scheduler, SchedulerStep};
use crate::engine::{JobName, JobOutcome, RuntimeOptions};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Put these jobs on the ready queue.
    Dispatch(Vec<ScheduledJob>),
    /// Workers must not start anything else.
    StopDispatch,
    /// Kill every running job.
    KillRunning,
    /// The job was settled before its start arrived; its worker must not
    /// launch it.
    RefuseStart(JobName),
    /// Every job is terminal; the run is over.
    Finish,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    /// Whether this step refused a worker's start request.
    pub fn refuses_start(&self) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, CoreCommand::RefuseStart(_)))
    }
}

/// Seed the run: admission plus the initial ready set.
pub fn handle_run_start(scheduler: &mut Scheduler, options: &RuntimeOptions) -> CoreStep {
    let step = scheduler.start();
    commands_for(scheduler, options, step)
}

/// A worker started a job.
pub fn handle_job_started(
    scheduler: &mut Scheduler,
    name: JobName,
    started_at: Instant,
) -> CoreStep {
    let commands = if scheduler.handle_started(&name, started_at) {
        Vec::new()
    } else {
        vec![CoreCommand::RefuseStart(name)]
    };
    CoreStep {
        commands,
        keep_running: !scheduler.is_finished(),
    }
}

/// A worker finished a job.
pub fn handle_job_finished(
    scheduler: &mut Scheduler,
    options: &RuntimeOptions,
    name: JobName,
    outcome: JobOutcome,
) -> CoreStep {
    let step = scheduler.handle_finished(&name, outcome);
    commands_for(scheduler, options, step)
}

/// Shutdown requested: skip everything not yet running and kill the rest,
/// regardless of halt mode.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    info!("shutdown requested; cancelling run");
    let mut step = SchedulerStep::default();
    scheduler.halt(RUN_CANCELLED, &mut step);

    let mut commands = vec![CoreCommand::StopDispatch, CoreCommand::KillRunning];
    let keep_running = !step.run_just_finished;
    if !keep_running {
        commands.push(CoreCommand::Finish);
    }
    CoreStep {
        commands,
        keep_running,
    }
}

/// Translate a scheduler step into shell commands.
fn commands_for(scheduler: &Scheduler, options: &RuntimeOptions, step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::Dispatch(step.newly_scheduled));
    }

    if step.halted {
        commands.push(CoreCommand::StopDispatch);
        // Only a halt on error kills; running out of `--max-fails` lets
        // in-flight jobs finish.
        if scheduler.halt_reason() == Some(RUN_CANCELLED) && options.halt_mode == HaltMode::Kill {
            commands.push(CoreCommand::KillRunning);
        }
    }

    let keep_running = !step.run_just_finished;
    if !keep_running {
        commands.push(CoreCommand::Finish);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
