// tests/scheduler_tests.rs

use std::time::{Duration, Instant};

use testdag::config::{HaltMode, JobSpec, RunConfig};
use testdag::dag::{Admission, Scheduler, Status};
use testdag::engine::JobOutcome;
use testdag::errors::SpecError;
use testdag::evaluate::EvaluatorRegistry;
use testdag_test_utils::builders::{JobSpecBuilder, RunConfigBuilder};

fn job(name: &str) -> JobSpecBuilder {
    JobSpecBuilder::new(name)
}

fn scheduler(specs: Vec<JobSpec>, config: &RunConfig) -> Scheduler {
    Scheduler::new(specs, config, &EvaluatorRegistry::with_builtins()).expect("valid job set")
}

fn outcome(status: Status) -> JobOutcome {
    JobOutcome {
        message: status.reason().map(str::to_string),
        status,
        output: String::new(),
        elapsed: Duration::from_millis(5),
        attempts: 1,
    }
}

fn names(jobs: &[testdag::dag::ScheduledJob]) -> Vec<&str> {
    jobs.iter().map(|j| j.name.as_str()).collect()
}

/// Report the job as started and finished with `status`.
fn finish(s: &mut Scheduler, name: &str, status: Status) -> testdag::dag::SchedulerStep {
    s.handle_started(name, Instant::now());
    s.handle_finished(name, outcome(status))
}

#[test]
fn failure_cascades_down_the_chain() {
    let config = RunConfigBuilder::new().build();
    let mut s = scheduler(
        vec![
            job("A").build(),
            job("B").prereq("A").build(),
            job("C").prereq("B").build(),
        ],
        &config,
    );

    let step = s.start();
    assert_eq!(names(&step.newly_scheduled), vec!["A"]);

    let step = finish(&mut s, "A", Status::Fail("nonzero exit".into()));
    assert!(step.newly_scheduled.is_empty());
    assert!(step.run_just_finished);

    assert_eq!(
        s.status_of("B"),
        Some(&Status::Skip("prereq A did not succeed".into()))
    );
    assert_eq!(
        s.status_of("C"),
        Some(&Status::Skip("prereq B did not succeed".into()))
    );
    assert_eq!(s.report().exit_code(), 1);
}

#[test]
fn cycle_is_rejected_before_anything_runs() {
    let config = RunConfigBuilder::new().build();
    let err = Scheduler::new(
        vec![
            job("A").prereq("C").build(),
            job("B").prereq("A").build(),
            job("C").prereq("B").build(),
        ],
        &config,
        &EvaluatorRegistry::with_builtins(),
    )
    .unwrap_err();

    assert!(err
        .iter()
        .any(|e| e.to_string() == "Cyclic or Invalid Dependency Detected: A, B, C"));
}

#[test]
fn validation_collects_every_problem() {
    let config = RunConfigBuilder::new().slots(2, 2).build();
    let mut bad_pattern = job("pattern").expect_out("(unclosed").build();
    bad_pattern.max_time = Some(-1.0);

    let err = Scheduler::new(
        vec![
            job("big").procs(4, 4).build(),
            job("caps").capabilities("petsc >=").build(),
            job("plugin").evaluator("mesh_diff").build(),
            job("empty").command("  ").build(),
            bad_pattern,
        ],
        &config,
        &EvaluatorRegistry::with_builtins(),
    )
    .unwrap_err();

    let errors: Vec<&SpecError> = err.iter().collect();
    assert!(errors.iter().any(|e| matches!(e, SpecError::ExceedsCapacity { job, .. } if job == "big")));
    assert!(errors.iter().any(|e| matches!(e, SpecError::InvalidCapability { job, .. } if job == "caps")));
    assert!(errors.iter().any(|e| matches!(e, SpecError::UnknownEvaluator { evaluator, .. } if evaluator == "mesh_diff")));
    assert!(errors.iter().any(|e| matches!(e, SpecError::EmptyCommand(job) if job == "empty")));
    assert!(errors.iter().any(|e| matches!(e, SpecError::InvalidPattern { job, .. } if job == "pattern")));
    assert!(errors.iter().any(|e| matches!(e, SpecError::InvalidResources { job, .. } if job == "pattern")));
}

#[test]
fn max_time_too_large_for_a_duration_is_rejected() {
    let config = RunConfigBuilder::new().build();
    let err = Scheduler::new(
        vec![job("forever").max_time(1e30).build()],
        &config,
        &EvaluatorRegistry::with_builtins(),
    )
    .unwrap_err();

    assert!(err.iter().any(|e| matches!(
        e,
        SpecError::InvalidResources { job, reason } if job == "forever" && reason.contains("too large")
    )));
}

#[test]
fn mpi_gated_job_is_skipped_without_running() {
    let config = RunConfigBuilder::new().build();
    let mut s = scheduler(
        vec![
            job("parallel").capabilities("mpi_procs>1").build(),
            job("after").prereq("parallel").build(),
        ],
        &config,
    );

    let step = s.start();
    assert!(step.newly_scheduled.is_empty());
    assert!(step.run_just_finished);
    assert_eq!(
        s.status_of("parallel"),
        Some(&Status::Skip("capability/platform mismatch".into()))
    );
    assert_eq!(
        s.status_of("after"),
        Some(&Status::Skip("prereq parallel did not succeed".into()))
    );
    assert_eq!(s.report().exit_code(), 0, "skips never fail the run");
}

#[test]
fn requested_procs_satisfy_mpi_gate() {
    let config = RunConfigBuilder::new().slots(4, 4).procs(2).build();
    let mut s = scheduler(
        vec![job("parallel").capabilities("mpi_procs>1").procs(1, 4).build()],
        &config,
    );

    let step = s.start();
    assert_eq!(names(&step.newly_scheduled), vec!["parallel"]);
    assert_eq!(step.newly_scheduled[0].reservation.procs, 2);
}

#[test]
fn ignore_prereq_failure_still_runs() {
    let config = RunConfigBuilder::new().build();
    let mut s = scheduler(
        vec![
            job("setup").build(),
            job("teardown").prereq("setup").ignore_prereq_failure().build(),
        ],
        &config,
    );
    s.start();

    let step = finish(&mut s, "setup", Status::Timeout);
    assert_eq!(names(&step.newly_scheduled), vec!["teardown"]);
}

#[test]
fn dependents_wait_for_every_prereq() {
    let config = RunConfigBuilder::new().build();
    let mut s = scheduler(
        vec![
            job("A").build(),
            job("B").build(),
            job("C").prereq("A").prereq("B").build(),
        ],
        &config,
    );

    let step = s.start();
    assert_eq!(names(&step.newly_scheduled), vec!["A", "B"]);

    let step = finish(&mut s, "A", Status::Success);
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(s.status_of("C"), Some(&Status::Pending));

    let step = finish(&mut s, "B", Status::Success);
    assert_eq!(names(&step.newly_scheduled), vec!["C"]);
}

#[test]
fn halt_on_error_skips_everything_not_running() {
    let config = RunConfigBuilder::new()
        .halt_on_error(HaltMode::Kill)
        .build();
    let mut s = scheduler(
        vec![
            job("A").build(),
            job("B").build(),
            job("C").build(),
            job("D").prereq("B").build(),
        ],
        &config,
    );

    let step = s.start();
    assert_eq!(names(&step.newly_scheduled), vec!["A", "B", "C"]);
    s.handle_started("A", Instant::now());
    s.handle_started("B", Instant::now());

    let step = finish(&mut s, "A", Status::Fail("nonzero exit".into()));
    assert!(step.halted);
    assert_eq!(s.halt_reason(), Some("run cancelled"));
    assert_eq!(s.status_of("C"), Some(&Status::Skip("run cancelled".into())));
    assert_eq!(s.status_of("D"), Some(&Status::Skip("run cancelled".into())));
    assert_eq!(s.status_of("B"), Some(&Status::Running));
    assert!(!step.run_just_finished);

    let step = s.handle_finished("B", outcome(Status::Skip("run cancelled".into())));
    assert!(step.run_just_finished);
}

#[test]
fn max_fails_stops_dispatch() {
    let config = RunConfigBuilder::new().slots(1, 1).max_fails(1).build();
    let mut s = scheduler(vec![job("A").build(), job("B").build()], &config);
    s.start();

    let step = finish(&mut s, "A", Status::Fail("nonzero exit".into()));
    assert!(step.halted);
    assert_eq!(s.halt_reason(), Some("max failures reached"));
    assert_eq!(
        s.status_of("B"),
        Some(&Status::Skip("max failures reached".into()))
    );
}

#[test]
fn late_completion_is_ignored() {
    let config = RunConfigBuilder::new().build();
    let mut s = scheduler(vec![job("A").build()], &config);
    s.start();
    finish(&mut s, "A", Status::Success);

    let step = s.handle_finished("A", outcome(Status::Fail("nonzero exit".into())));
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(s.status_of("A"), Some(&Status::Success));
}

#[test]
fn light_jobs_are_queued_before_heavy_ones() {
    let config = RunConfigBuilder::new().all_tests().build();
    let mut s = scheduler(
        vec![job("a_heavy").heavy().build(), job("b_light").build()],
        &config,
    );

    let step = s.start();
    assert_eq!(names(&step.newly_scheduled), vec!["b_light", "a_heavy"]);
}

#[test]
fn heavy_selection() {
    let specs = || vec![job("big").heavy().build(), job("small").build()];

    let mut s = scheduler(specs(), &RunConfigBuilder::new().build());
    s.start();
    assert_eq!(s.status_of("big"), Some(&Status::Skip("heavy".into())));
    assert_eq!(s.status_of("small"), Some(&Status::Queued));

    let mut s = scheduler(specs(), &RunConfigBuilder::new().heavy().build());
    s.start();
    assert_eq!(s.status_of("big"), Some(&Status::Queued));
    assert_eq!(s.status_of("small"), Some(&Status::Skip("not heavy".into())));
    assert!(s.report().get("small").unwrap().silent);
}

#[test]
fn unselected_prereq_does_not_block_dependents() {
    let config = RunConfigBuilder::new().name_filter("^check").build();
    let mut s = scheduler(
        vec![job("build").build(), job("check_unit").prereq("build").build()],
        &config,
    );

    let step = s.start();
    assert_eq!(names(&step.newly_scheduled), vec!["check_unit"]);
    assert_eq!(s.status_of("build"), Some(&Status::Skip("not selected".into())));
}

#[test]
fn deleted_prereq_does_not_block_dependents() {
    let config = RunConfigBuilder::new().build();
    let mut old = job("old").build();
    old.deleted = Some("replaced by new".to_string());
    let mut s = scheduler(vec![old, job("new").prereq("old").build()], &config);

    let step = s.start();
    assert_eq!(names(&step.newly_scheduled), vec!["new"]);
    assert_eq!(
        s.status_of("old"),
        Some(&Status::Skip("deleted: replaced by new".into()))
    );
    assert!(s.report().get("old").unwrap().silent);

    finish(&mut s, "new", Status::Success);
    assert!(s.is_finished());
}

#[test]
fn start_after_halt_is_refused() {
    let config = RunConfigBuilder::new()
        .halt_on_error(HaltMode::Drain)
        .build();
    let mut s = scheduler(vec![job("A").build(), job("B").build()], &config);

    let step = s.start();
    assert_eq!(names(&step.newly_scheduled), vec!["A", "B"]);

    // B's worker holds its lease, but A's failure is seen first.
    let step = finish(&mut s, "A", Status::Fail("nonzero exit".into()));
    assert!(step.halted);
    assert_eq!(s.status_of("B"), Some(&Status::Skip("run cancelled".into())));

    assert!(!s.handle_started("B", Instant::now()));
    assert_eq!(s.status_of("B"), Some(&Status::Skip("run cancelled".into())));
    assert!(s.is_finished());
}

#[test]
fn explicit_skip_cascades() {
    let config = RunConfigBuilder::new().build();
    let mut s = scheduler(
        vec![
            job("flaky").skip("known broken").build(),
            job("after").prereq("flaky").build(),
        ],
        &config,
    );
    s.start();
    assert_eq!(s.status_of("flaky"), Some(&Status::Skip("known broken".into())));
    assert_eq!(
        s.status_of("after"),
        Some(&Status::Skip("prereq flaky did not succeed".into()))
    );
}

#[test]
fn plan_lists_admission_without_changing_state() {
    let config = RunConfigBuilder::new().build();
    let s = scheduler(
        vec![
            job("A").build(),
            job("B").prereq("A").capabilities("cuda").build(),
        ],
        &config,
    );

    let plan = s.plan();
    assert_eq!(plan[0].name, "A");
    assert_eq!(plan[0].admission, Admission::Run);
    assert_eq!(plan[1].prereqs, vec!["A".to_string()]);
    assert!(matches!(&plan[1].admission, Admission::Skip { reason, .. } if reason == "capability/platform mismatch"));
    assert_eq!(s.status_of("B"), Some(&Status::Pending));
}

#[test]
fn scheduling_is_deterministic() {
    let run = || {
        let config = RunConfigBuilder::new().build();
        let mut s = scheduler(
            vec![
                job("A").build(),
                job("B").prereq("A").build(),
                job("C").build(),
                job("D").prereq("C").prereq("B").build(),
            ],
            &config,
        );
        let mut order = Vec::new();
        let mut ready: Vec<String> = names(&s.start().newly_scheduled)
            .into_iter()
            .map(str::to_string)
            .collect();
        while let Some(name) = ready.first().cloned() {
            ready.remove(0);
            let status = if name == "C" {
                Status::Fail("nonzero exit".into())
            } else {
                Status::Success
            };
            let step = finish(&mut s, &name, status);
            ready.extend(step.newly_scheduled.into_iter().map(|j| j.name));
            order.push(name);
        }
        (order, s.report())
    };

    let (order_a, report_a) = run();
    let (order_b, report_b) = run();
    assert_eq!(order_a, order_b);
    assert_eq!(report_a, report_b);
    assert_eq!(
        report_a.status_of("D"),
        Some(&Status::Skip("prereq C did not succeed".into()))
    );
}
