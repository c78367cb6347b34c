// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::job::ScheduledJob;

/// Structured result of a single scheduler "step".
///
/// Tests use this to drive the scheduler by hand and assert on what
/// changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Jobs that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledJob>,
    /// Jobs that reached `Skip` in this step (cascades included).
    pub newly_skipped: Vec<String>,
    /// Whether this step halted the run (halt-on-error or max fails).
    pub halted: bool,
    /// Whether every job is now terminal.
    pub run_just_finished: bool,
}
