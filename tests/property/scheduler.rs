use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use proptest::prelude::*;
use testdag::config::JobSpec;
use testdag::dag::{Scheduler, Status};
use testdag::engine::JobOutcome;
use testdag::evaluate::EvaluatorRegistry;
use testdag_test_utils::builders::{JobSpecBuilder, RunConfigBuilder};

// Strategy to generate an acyclic job set.
// We ensure acyclicity by only allowing job N to depend on jobs 0..N-1.
fn job_set_strategy(max_jobs: usize) -> impl Strategy<Value = Vec<JobSpec>> {
    (1..=max_jobs).prop_flat_map(|num_jobs| {
        let deps_strat = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_jobs),
            num_jobs,
        );
        let ignore_strat = proptest::collection::vec(any::<bool>(), num_jobs);

        (deps_strat, ignore_strat).prop_map(move |(raw_deps, ignore)| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential_deps)| {
                    let mut builder = JobSpecBuilder::new(&format!("job_{i:02}"));
                    let valid: BTreeSet<usize> = potential_deps
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|d| d % i)
                        .collect();
                    for dep in valid {
                        builder = builder.prereq(&format!("job_{dep:02}"));
                    }
                    if ignore[i] {
                        builder = builder.ignore_prereq_failure();
                    }
                    builder.build()
                })
                .collect()
        })
    })
}

fn outcome(status: Status) -> JobOutcome {
    JobOutcome {
        message: None,
        status,
        output: String::new(),
        elapsed: Duration::ZERO,
        attempts: 1,
    }
}

/// Drive the scheduler to completion, finishing ready jobs in FIFO order.
/// Returns the dispatch order and the final scheduler.
fn drive(specs: Vec<JobSpec>, failing: &HashSet<usize>) -> (Vec<String>, Scheduler) {
    let config = RunConfigBuilder::new().max_fails(0).build();
    let mut scheduler = Scheduler::new(specs, &config, &EvaluatorRegistry::with_builtins())
        .expect("generated job sets are valid");

    let mut ready: Vec<String> = scheduler
        .start()
        .newly_scheduled
        .into_iter()
        .map(|j| j.name)
        .collect();
    let mut dispatched = Vec::new();

    while !ready.is_empty() {
        let name = ready.remove(0);

        // Every prereq must be terminal before the job starts.
        for dep in scheduler.graph().dependencies_of(&name) {
            assert!(
                scheduler.status_of(dep).unwrap().is_terminal(),
                "{name} dispatched before prereq {dep} was terminal"
            );
        }

        scheduler.handle_started(&name, Instant::now());
        let index: usize = name["job_".len()..].parse().unwrap();
        let status = if failing.contains(&index) {
            Status::Fail("nonzero exit".into())
        } else {
            Status::Success
        };
        let step = scheduler.handle_finished(&name, outcome(status));
        ready.extend(step.newly_scheduled.into_iter().map(|j| j.name));
        dispatched.push(name);
    }

    (dispatched, scheduler)
}

proptest! {
    #[test]
    fn scheduler_always_terminates(
        specs in job_set_strategy(12),
        failing in proptest::collection::hash_set(0..12usize, 0..4),
    ) {
        let (_, scheduler) = drive(specs, &failing);
        prop_assert!(scheduler.is_finished());
    }

    #[test]
    fn failures_skip_every_dependent_that_does_not_opt_out(
        specs in job_set_strategy(12),
        failing in proptest::collection::hash_set(0..12usize, 0..4),
    ) {
        let (_, scheduler) = drive(specs, &failing);

        for name in scheduler.job_names() {
            let job = scheduler.job(name).unwrap();
            let prereqs = scheduler.graph().dependencies_of(name);
            let bad_prereq = prereqs
                .iter()
                .find(|p| !scheduler.status_of(p).unwrap().is_success());

            match (bad_prereq, job.spec.ignore_prereq_failure) {
                (Some(_), false) => {
                    let Status::Skip(reason) = job.status() else {
                        panic!("{name} should be skipped, is {}", job.status());
                    };
                    let named = prereqs
                        .iter()
                        .any(|p| *reason == format!("prereq {p} did not succeed"));
                    prop_assert!(named, "{name}: unexpected reason {reason}");
                }
                _ => {
                    prop_assert!(!job.status().is_skip(), "{name} skipped unexpectedly");
                }
            }
        }
    }

    #[test]
    fn scheduling_is_idempotent(
        specs in job_set_strategy(10),
        failing in proptest::collection::hash_set(0..10usize, 0..3),
    ) {
        let (order_a, a) = drive(specs.clone(), &failing);
        let (order_b, b) = drive(specs, &failing);
        prop_assert_eq!(order_a, order_b);
        prop_assert_eq!(a.report(), b.report());
    }
}
