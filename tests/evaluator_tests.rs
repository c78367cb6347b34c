// tests/evaluator_tests.rs

use std::sync::Arc;
use std::time::Duration;

use testdag::config::JobSpec;
use testdag::dag::Status;
use testdag::errors::EvaluatorError;
use testdag::evaluate::{EvaluatorRegistry, ResultEvaluator, Verdict};
use testdag::exec::RawResult;
use testdag_test_utils::builders::JobSpecBuilder;

fn exited(code: i32, output: &str) -> RawResult {
    RawResult {
        exit_code: Some(code),
        output: output.to_string(),
        elapsed: Duration::from_millis(10),
        ..RawResult::default()
    }
}

fn evaluate(spec: &JobSpec, raw: &RawResult) -> Verdict {
    EvaluatorRegistry::with_builtins().evaluate_all(spec, raw)
}

#[test]
fn zero_exit_passes() {
    let spec = JobSpecBuilder::new("a").build();
    assert_eq!(evaluate(&spec, &exited(0, "")).status, Status::Success);
}

#[test]
fn nonzero_exit_fails_with_code_in_message() {
    let spec = JobSpecBuilder::new("a").build();
    let verdict = evaluate(&spec, &exited(3, ""));
    assert_eq!(verdict.status, Status::Fail("nonzero exit".to_string()));
    assert_eq!(verdict.message.as_deref(), Some("nonzero exit (3)"));
}

#[test]
fn expected_nonzero_exit_code() {
    let spec = JobSpecBuilder::new("a").expect_exit_code(2).build();
    assert!(evaluate(&spec, &exited(2, "")).status.is_success());
    assert_eq!(
        evaluate(&spec, &exited(0, "")).status,
        Status::Fail("EXIT CODE 0 != 2".to_string())
    );
}

#[test]
fn killed_process_has_no_exit_code() {
    let spec = JobSpecBuilder::new("a").build();
    let raw = RawResult::default();
    assert!(evaluate(&spec, &raw).status.is_failure());
}

#[test]
fn timeout_and_cancel_take_precedence() {
    let spec = JobSpecBuilder::new("a").expect_out("never").build();

    let timed_out = RawResult {
        timed_out: true,
        ..RawResult::default()
    };
    assert_eq!(evaluate(&spec, &timed_out).status, Status::Timeout);

    let cancelled = RawResult {
        cancelled: true,
        ..RawResult::default()
    };
    assert_eq!(
        evaluate(&spec, &cancelled).status,
        Status::Skip("run cancelled".to_string())
    );
}

#[test]
fn expect_out_spans_lines() {
    let spec = JobSpecBuilder::new("a").expect_out("^start.*done$").build();
    assert!(evaluate(&spec, &exited(0, "start\nmiddle\ndone\n")).status.is_success());
    assert_eq!(
        evaluate(&spec, &exited(0, "start\nmiddle\n")).status,
        Status::Fail("pattern not found".to_string())
    );
}

#[test]
fn absent_out_and_literal_matching() {
    let spec = JobSpecBuilder::new("a").absent_out("ERROR [0-9]+").build();
    assert!(evaluate(&spec, &exited(0, "all good")).status.is_success());
    assert_eq!(
        evaluate(&spec, &exited(0, "ERROR 42")).status,
        Status::Fail("unexpected pattern found".to_string())
    );

    let mut literal = JobSpecBuilder::new("b").expect_out("a+b (c)").build();
    literal.match_literal = true;
    assert!(evaluate(&literal, &exited(0, "x a+b (c) y")).status.is_success());
}

#[test]
fn exit_code_checked_before_pattern() {
    let spec = JobSpecBuilder::new("a").expect_out("ok").build();
    assert_eq!(
        evaluate(&spec, &exited(1, "ok")).status,
        Status::Fail("nonzero exit".to_string())
    );
}

#[test]
fn existence_checks_resolve_against_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("made.txt"), "x").unwrap();

    let mut spec = JobSpecBuilder::new("a").build();
    spec.working_directory = Some(dir.path().to_path_buf());
    spec.expect_files = vec!["made.txt".into()];
    assert!(evaluate(&spec, &exited(0, "")).status.is_success());

    spec.expect_files = vec!["made.txt".into(), "absent.txt".into()];
    assert_eq!(
        evaluate(&spec, &exited(0, "")).status,
        Status::Fail("missing file(s): absent.txt".to_string())
    );

    spec.expect_files.clear();
    spec.forbid_files = vec!["made.txt".into()];
    assert_eq!(
        evaluate(&spec, &exited(0, "")).status,
        Status::Fail("forbidden file(s) present: made.txt".to_string())
    );
}

struct Panicky;

impl ResultEvaluator for Panicky {
    fn name(&self) -> &'static str {
        "panicky"
    }

    fn evaluate(&self, _spec: &JobSpec, _raw: &RawResult) -> Result<Verdict, EvaluatorError> {
        panic!("comparator crashed");
    }
}

struct Erroring;

impl ResultEvaluator for Erroring {
    fn name(&self) -> &'static str {
        "erroring"
    }

    fn evaluate(&self, _spec: &JobSpec, _raw: &RawResult) -> Result<Verdict, EvaluatorError> {
        Err(EvaluatorError::new("erroring", "reference file unreadable"))
    }
}

#[test]
fn plugin_panic_becomes_fail() {
    let mut registry = EvaluatorRegistry::with_builtins();
    registry.register(Arc::new(Panicky));

    let spec = JobSpecBuilder::new("a").evaluator("panicky").build();
    let verdict = registry.evaluate_all(&spec, &exited(0, ""));

    match verdict.status {
        Status::Fail(reason) => {
            assert!(reason.starts_with("evaluator error:"), "got: {reason}");
            assert!(reason.contains("comparator crashed"), "got: {reason}");
        }
        other => panic!("expected Fail, got {other:?}"),
    }
}

#[test]
fn plugin_error_becomes_fail() {
    let mut registry = EvaluatorRegistry::with_builtins();
    registry.register(Arc::new(Erroring));

    let spec = JobSpecBuilder::new("a")
        .evaluator("exit_code")
        .evaluator("erroring")
        .build();
    let verdict = registry.evaluate_all(&spec, &exited(0, ""));
    assert_eq!(
        verdict.status,
        Status::Fail("evaluator error: erroring: reference file unreadable".to_string())
    );
}

#[test]
fn registry_lists_builtins() {
    let registry = EvaluatorRegistry::with_builtins();
    let names: Vec<&str> = registry.names().collect();
    assert_eq!(names, vec!["existence", "exit_code", "pattern"]);
    assert!(!registry.contains("panicky"));
}
