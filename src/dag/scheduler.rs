// src/dag/scheduler.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::model::JobSpec;
use crate::config::validate::validate_jobs;
use crate::config::RunConfig;
use crate::dag::admission::{admit, Admission};
use crate::dag::graph::{DependencyGraph, ReadyTracker};
use crate::dag::job::{Job, ScheduledJob};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::status::{prereq_failed, Status, MAX_FAILS, RUN_CANCELLED};
use crate::engine::report::{ReportEntry, RunReport};
use crate::engine::JobOutcome;
use crate::errors::SpecErrors;
use crate::evaluate::EvaluatorRegistry;
use crate::resources::Reservation;

/// One line of the `--dry-run` plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: String,
    pub prereqs: Vec<String>,
    pub reservation: Reservation,
    pub admission: Admission,
}

/// Scheduler holds the immutable graph plus all mutable per-run job state.
///
/// It is responsible for:
/// - deciding which jobs take part in the run at all
/// - handing out jobs whose prereqs are terminal, light jobs first
/// - recording outcomes and skipping dependents of jobs that did not succeed
/// - halting the run on error or once too many jobs failed
///
/// It is the only writer of job status.
#[derive(Debug)]
pub struct Scheduler {
    graph: DependencyGraph,
    tracker: ReadyTracker,
    jobs: BTreeMap<String, Job>,
    config: RunConfig,
    failures: usize,
    halt_reason: Option<String>,
}

impl Scheduler {
    /// Validate `specs` and build a scheduler with every job `Pending`.
    ///
    /// All validation problems are returned together.
    pub fn new(
        specs: Vec<JobSpec>,
        config: &RunConfig,
        evaluators: &EvaluatorRegistry,
    ) -> Result<Self, SpecErrors> {
        let graph = validate_jobs(&specs, config, evaluators)?;
        let tracker = graph.ready_tracker();

        let jobs = specs
            .into_iter()
            .map(|spec| {
                let reservation = spec.reservation(config.procs, config.nthreads);
                (spec.name.clone(), Job::new(Arc::new(spec), reservation))
            })
            .collect();

        Ok(Self {
            graph,
            tracker,
            jobs,
            config: config.clone(),
            failures: 0,
            halt_reason: None,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    pub fn status_of(&self, name: &str) -> Option<&Status> {
        self.jobs.get(name).map(Job::status)
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(|s| s.as_str())
    }

    /// Number of jobs that ended in `Fail` or `Timeout` so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Why the run was halted, if it was.
    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    /// Every job is terminal.
    pub fn is_finished(&self) -> bool {
        self.jobs.values().all(|j| j.status().is_terminal())
    }

    /// Admission plan in dispatch order, without changing any state.
    pub fn plan(&self) -> Vec<PlanEntry> {
        let order = self
            .graph
            .topological_order()
            .unwrap_or_else(|| self.jobs.keys().cloned().collect());

        order
            .into_iter()
            .filter_map(|name| {
                let job = self.jobs.get(&name)?;
                Some(PlanEntry {
                    prereqs: self.graph.dependencies_of(&name).to_vec(),
                    reservation: job.reservation,
                    admission: admit(&job.spec, job.reservation, &self.config),
                    name,
                })
            })
            .collect()
    }

    /// Apply admission to every job and schedule the initial ready set.
    pub fn start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let mut settled = Vec::new();

        for job in self.jobs.values_mut() {
            if let Admission::Skip {
                reason,
                silent,
                excluded,
            } = admit(&job.spec, job.reservation, &self.config)
            {
                debug!(job = %job.name(), %reason, silent, excluded, "job not admitted");
                job.silent = silent;
                job.excluded = excluded;
                job.message = Some(reason.clone());
                job.transition(Status::Skip(reason));
                step.newly_skipped.push(job.name().to_string());
                settled.push(job.name().to_string());
            }
        }

        let mut candidates = self.tracker.initially_ready();
        for name in settled {
            candidates.extend(self.settle(&name, &mut step));
        }

        step.newly_scheduled = self.queue_ready(candidates);
        step.run_just_finished = self.is_finished();

        info!(
            jobs = self.jobs.len(),
            scheduled = step.newly_scheduled.len(),
            skipped = step.newly_skipped.len(),
            "run started"
        );
        step
    }

    /// A worker holds `name`'s slots and asks to launch it.
    ///
    /// Returns whether the job is now `Running`. A job skipped by a halt
    /// before its start was seen stays skipped and must not be launched.
    pub fn handle_started(&mut self, name: &str, started_at: Instant) -> bool {
        let Some(job) = self.jobs.get_mut(name) else {
            warn!(job = %name, "start reported for unknown job; ignoring");
            return false;
        };
        if job.status().is_terminal() {
            debug!(job = %name, status = %job.status(), "start refused; job already settled");
            return false;
        }
        if job.transition(Status::Running) {
            job.started_at = Some(started_at);
            return true;
        }
        false
    }

    /// Record the final outcome of `name` and work out what follows.
    pub fn handle_finished(&mut self, name: &str, outcome: JobOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(job) = self.jobs.get_mut(name) else {
            warn!(job = %name, "completion for unknown job; ignoring");
            return step;
        };

        if job.status().is_terminal() {
            debug!(
                job = %name,
                status = %job.status(),
                "late completion for job that is already terminal; ignoring"
            );
            step.run_just_finished = self.is_finished();
            return step;
        }

        job.elapsed = outcome.elapsed;
        job.output = outcome.output;
        job.attempts = outcome.attempts;
        job.message = outcome.message;
        let failed = outcome.status.is_failure();
        let skipped = outcome.status.is_skip();
        job.transition(outcome.status);

        if failed {
            self.failures += 1;
            warn!(
                job = %name,
                failures = self.failures,
                "job did not succeed; skipping dependents"
            );
        } else if skipped {
            debug!(job = %name, "job skipped; skipping dependents");
        } else {
            debug!(job = %name, "job succeeded");
        }

        let candidates = self.settle(name, &mut step);

        if failed && self.halt_reason.is_none() {
            if self.config.halt_on_error {
                self.halt(RUN_CANCELLED, &mut step);
            } else if self.config.max_fails > 0 && self.failures >= self.config.max_fails {
                self.halt(MAX_FAILS, &mut step);
            }
        }

        step.newly_scheduled = self.queue_ready(candidates);
        step.run_just_finished = self.is_finished();
        step
    }

    /// Stop the run: every job not yet running becomes `Skip(reason)`.
    ///
    /// Running jobs are left alone; their outcomes still arrive through
    /// [`Scheduler::handle_finished`].
    pub fn halt(&mut self, reason: &str, step: &mut SchedulerStep) {
        if self.halt_reason.is_none() {
            info!(%reason, "halting run");
            self.halt_reason = Some(reason.to_string());
        }

        for job in self.jobs.values_mut() {
            if matches!(job.status(), Status::Pending | Status::Queued) {
                job.message = Some(reason.to_string());
                job.transition(Status::Skip(reason.to_string()));
                step.newly_skipped.push(job.name().to_string());
            }
        }
        step.halted = true;
        step.run_just_finished = self.is_finished();
    }

    /// Fold the current state into a report.
    pub fn report(&self) -> RunReport {
        let entries = self
            .jobs
            .values()
            .map(|job| {
                (
                    job.name().to_string(),
                    ReportEntry {
                        status: job.status().clone(),
                        elapsed: job.elapsed,
                        message: job.message.clone(),
                        attempts: job.attempts,
                        silent: job.silent,
                        output: job.output.clone(),
                    },
                )
            })
            .collect();
        RunReport::new(entries)
    }

    /// Mark `root` terminal in the tracker and cascade skips to dependents
    /// of jobs that did not succeed. Returns dependents that may now be
    /// ready.
    fn settle(&mut self, root: &str, step: &mut SchedulerStep) -> Vec<String> {
        let mut candidates = Vec::new();
        let mut stack: Vec<String> = vec![root.to_string()];

        while let Some(name) = stack.pop() {
            candidates.extend(self.tracker.mark_terminal(&self.graph, &name));

            // Jobs left out by selection or deletion do not hold their
            // dependents back.
            let satisfies_dependents = self.jobs.get(&name).is_some_and(|j| match j.status() {
                Status::Success => true,
                Status::Skip(_) => j.excluded,
                _ => false,
            });
            if satisfies_dependents {
                continue;
            }

            for dependent in self.graph.dependents_of(&name) {
                let Some(job) = self.jobs.get_mut(dependent) else {
                    continue;
                };
                if job.spec.ignore_prereq_failure || !matches!(job.status(), Status::Pending) {
                    continue;
                }

                let reason = prereq_failed(&name);
                debug!(job = %dependent, prereq = %name, "skipping dependent");
                job.message = Some(reason.clone());
                job.transition(Status::Skip(reason));
                step.newly_skipped.push(dependent.clone());
                stack.push(dependent.clone());
            }
        }

        candidates
    }

    /// Move ready `Pending` candidates to `Queued`, light jobs first, then
    /// by name.
    fn queue_ready(&mut self, mut candidates: Vec<String>) -> Vec<ScheduledJob> {
        candidates.sort();
        candidates.dedup();

        let mut ready: Vec<&mut Job> = self
            .jobs
            .iter_mut()
            .filter(|(name, job)| {
                matches!(job.status(), Status::Pending)
                    && candidates.binary_search(*name).is_ok()
                    && self.tracker.is_ready(name)
            })
            .map(|(_, job)| job)
            .collect();
        ready.sort_by(|a, b| {
            a.spec
                .heavy
                .cmp(&b.spec.heavy)
                .then_with(|| a.name().cmp(b.name()))
        });

        ready
            .into_iter()
            .filter_map(|job| {
                job.transition(Status::Queued).then(|| {
                    ScheduledJob::from_job(job, self.config.default_max_time, self.config.recover)
                })
            })
            .collect()
    }
}
