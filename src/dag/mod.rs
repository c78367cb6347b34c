// src/dag/mod.rs

//! Job graph and scheduling.
//!
//! - [`graph`] holds the prereq graph, cycle detection and incremental
//!   readiness tracking.
//! - [`status`] defines the job lifecycle and the standard skip reasons.
//! - [`job`] holds per-run job state and the description sent to workers.
//! - [`admission`] decides which jobs take part in a run.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   jobs are ready, and what happens to dependents when a job ends.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod admission;
pub mod graph;
pub mod job;
pub mod scheduler;
pub mod scheduler_step;
pub mod status;

pub use admission::Admission;
pub use graph::{DependencyGraph, ReadyTracker};
pub use job::{Job, ScheduledJob};
pub use scheduler::{PlanEntry, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use status::Status;
