// tests/runner_tests.rs
#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use testdag::config::JobSpec;
use testdag::dag::{Job, ScheduledJob, Status};
use testdag::errors::LaunchError;
use testdag::evaluate::EvaluatorRegistry;
use testdag::exec::output::trim_output;
use testdag::exec::{run_job, ProcessExecutor};
use testdag::resources::Reservation;
use testdag_test_utils::builders::{JobSpecBuilder, RunConfigBuilder};
use testdag_test_utils::init_tracing;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_TIME: Duration = Duration::from_secs(30);

fn scheduled(spec: JobSpec) -> ScheduledJob {
    let job = Job::new(Arc::new(spec), Reservation::new(1, 1));
    ScheduledJob::from_job(&job, DEFAULT_MAX_TIME, false)
}

#[tokio::test]
async fn captures_stdout_and_stderr_together() {
    init_tracing();
    let job = scheduled(JobSpecBuilder::new("both").command("echo out; echo err 1>&2").build());

    let raw = run_job(&job, CancellationToken::new(), 0).await.unwrap();
    assert_eq!(raw.exit_code, Some(0));
    assert!(raw.output.contains("out\n"));
    assert!(raw.output.contains("err\n"));
    assert!(!raw.timed_out && !raw.cancelled);
}

#[tokio::test]
async fn reports_exit_code() {
    let job = scheduled(JobSpecBuilder::new("three").command("exit 3").build());
    let raw = run_job(&job, CancellationToken::new(), 0).await.unwrap();
    assert_eq!(raw.exit_code, Some(3));
}

#[tokio::test]
async fn substitutes_placeholders_and_sets_env() {
    let spec = JobSpecBuilder::new("envjob")
        .command("echo {name} {procs} {threads} $TESTDAG_JOB $OMP_NUM_THREADS $CUSTOM")
        .env("CUSTOM", "hello")
        .build();
    let raw = run_job(&scheduled(spec), CancellationToken::new(), 0)
        .await
        .unwrap();
    assert_eq!(raw.output.trim(), "envjob 1 1 envjob 1 hello");
}

#[tokio::test]
async fn runs_in_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = JobSpecBuilder::new("pwd").command("touch marker && ls").build();
    spec.working_directory = Some(dir.path().to_path_buf());

    let raw = run_job(&scheduled(spec), CancellationToken::new(), 0)
        .await
        .unwrap();
    assert_eq!(raw.exit_code, Some(0));
    assert!(dir.path().join("marker").exists());
}

#[tokio::test]
async fn timeout_kills_the_whole_process_tree() {
    init_tracing();
    // The background sleep inherits stdout; if it survived, reading output
    // would stall until the grace period ran out.
    let spec = JobSpecBuilder::new("slow")
        .command("sleep 30 & sleep 5")
        .max_time(1.0)
        .build();
    let job = scheduled(spec.clone());

    let started = Instant::now();
    let raw = run_job(&job, CancellationToken::new(), 0).await.unwrap();
    let wall = started.elapsed();

    assert!(raw.timed_out);
    assert_eq!(raw.exit_code, None);
    assert!(raw.elapsed >= Duration::from_millis(950), "elapsed {:?}", raw.elapsed);
    assert!(raw.elapsed < Duration::from_millis(1800), "elapsed {:?}", raw.elapsed);
    assert!(wall < Duration::from_millis(2500), "wall {wall:?}");

    let verdict = EvaluatorRegistry::with_builtins().evaluate_all(&spec, &raw);
    assert_eq!(verdict.status, Status::Timeout);
}

#[tokio::test]
async fn background_processes_do_not_outlive_the_job() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let spec = JobSpecBuilder::new("bg")
        .command(&format!("(sleep 1; touch '{}') & echo done", marker.display()))
        .build();

    let started = Instant::now();
    let raw = run_job(&scheduled(spec), CancellationToken::new(), 0)
        .await
        .unwrap();
    assert_eq!(raw.exit_code, Some(0));
    assert_eq!(raw.output, "done\n");
    assert!(started.elapsed() < Duration::from_millis(900), "took {:?}", started.elapsed());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "background process survived the job");
}

#[tokio::test]
async fn cancellation_kills_promptly() {
    let job = scheduled(JobSpecBuilder::new("cancel").command("sleep 10").build());
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let raw = run_job(&job, cancel, 0).await.unwrap();
    assert!(raw.cancelled);
    assert!(!raw.timed_out);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn missing_working_directory_is_a_launch_error() {
    let mut spec = JobSpecBuilder::new("nowhere").command("true").build();
    spec.working_directory = Some("/definitely/not/here".into());

    let err = run_job(&scheduled(spec), CancellationToken::new(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, LaunchError::Spawn { .. }));
}

#[tokio::test]
async fn large_output_is_trimmed() {
    let job = scheduled(
        JobSpecBuilder::new("noisy")
            .command("i=0; while [ $i -lt 2000 ]; do echo line$i; i=$((i+1)); done")
            .build(),
    );
    let raw = run_job(&job, CancellationToken::new(), 1000).await.unwrap();
    assert!(raw.output.starts_with("line0\n"));
    assert!(raw.output.ends_with("line1999\n"));
    assert!(raw.output.contains("output trimmed"));
}

#[test]
fn trim_keeps_char_boundaries() {
    let text = "é".repeat(100);
    let trimmed = trim_output(text.clone(), 11);
    assert!(trimmed.contains("bytes omitted"));
    assert_eq!(trim_output(text.clone(), 0), text);
    assert_eq!(trim_output("short".to_string(), 100), "short");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn third_job_waits_for_a_free_slot() {
    init_tracing();
    let config = RunConfigBuilder::new().slots(2, 2).workers(2).build();
    let specs = (0..3)
        .map(|i| JobSpecBuilder::new(&format!("sleep{i}")).command("sleep 1").build())
        .collect();

    let started = Instant::now();
    let report = testdag::execute(
        specs,
        &config,
        Arc::new(ProcessExecutor::new(config.max_output_bytes)),
        Arc::new(EvaluatorRegistry::with_builtins()),
    )
    .await
    .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2), "took {:?}", started.elapsed());
    assert_eq!(report.summary().passed, 3);
}
