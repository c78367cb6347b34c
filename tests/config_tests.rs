// tests/config_tests.rs

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use tempfile::NamedTempFile;
use testdag::cli::CliArgs;
use testdag::config::{load_suite, DefaultsSection, RunConfig};
use testdag::dag::Scheduler;
use testdag::errors::{HarnessError, SpecError};
use testdag::evaluate::EvaluatorRegistry;

fn suite_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn args(extra: &[&str]) -> CliArgs {
    let mut argv = vec!["testdag"];
    argv.extend_from_slice(extra);
    CliArgs::try_parse_from(argv).expect("valid arguments")
}

#[test]
fn loads_suite_with_defaults_and_tests() {
    let file = suite_file(
        r#"
[defaults]
max_time = 120

[[test]]
name = "mesh"
command = "mesh-tool --out mesh.e"

[[test]]
name = "solve"
command = "solver -i solve.i"
prereq = ["mesh"]
capabilities = "petsc>=3.18 & !slepc"
expect_out = "Solve Converged"
min_parallel = 2
max_parallel = 4
working_directory = "solve"
env = { SOLVER_OPTS = "-v" }
"#,
    );

    let suite = load_suite(file.path()).unwrap();
    assert_eq!(suite.defaults.max_time, Some(120.0));
    assert_eq!(suite.jobs.len(), 2);

    let solve = &suite.jobs[1];
    assert_eq!(solve.prereq, vec!["mesh"]);
    assert_eq!(solve.min_parallel, 2);
    assert_eq!(solve.max_threads, 16, "defaults fill unset fields");
    assert!(solve.recover);
    assert_eq!(solve.platform, vec!["ALL"]);
    assert_eq!(solve.env.get("SOLVER_OPTS").map(String::as_str), Some("-v"));

    let root = file.path().parent().unwrap();
    assert_eq!(solve.working_directory.as_deref(), Some(root.join("solve").as_path()));
    assert_eq!(suite.jobs[0].working_directory.as_deref(), Some(root));
}

#[test]
fn unknown_keys_are_rejected() {
    let file = suite_file(
        r#"
[[test]]
name = "a"
command = "true"
prereqs = ["typo"]
"#,
    );

    match load_suite(file.path()) {
        Err(HarnessError::TomlError(e)) => assert!(e.to_string().contains("prereqs")),
        other => panic!("expected TOML error, got {other:?}"),
    }
}

#[test]
fn missing_file_is_an_error() {
    let err = load_suite("/no/such/suite.toml").unwrap_err();
    assert!(format!("{err:#}").contains("reading suite file"), "{err:#}");
}

#[test]
fn duplicates_survive_loading_and_fail_validation() {
    let file = suite_file(
        r#"
[[test]]
name = "a"
command = "true"

[[test]]
name = "a"
command = "false"

[[test]]
name = "b"
command = "true"
prereq = ["ghost"]
"#,
    );

    let suite = load_suite(file.path()).unwrap();
    let config = RunConfig::from_args(&args(&["--max-parallel", "2"]), &suite.defaults).unwrap();
    let errors = Scheduler::new(suite.jobs, &config, &EvaluatorRegistry::with_builtins())
        .unwrap_err();

    let errors: Vec<&SpecError> = errors.iter().collect();
    assert!(errors.contains(&&SpecError::DuplicateName("a".into())));
    assert!(errors.contains(&&SpecError::UnknownPrereq {
        job: "b".into(),
        prereq: "ghost".into()
    }));
}

#[test]
fn timeout_precedence() {
    let defaults = DefaultsSection { max_time: Some(60.0) };

    let config = RunConfig::from_args(&args(&[]), &DefaultsSection::default()).unwrap();
    assert_eq!(config.default_max_time, Duration::from_secs(300));

    let config = RunConfig::from_args(&args(&[]), &defaults).unwrap();
    assert_eq!(config.default_max_time, Duration::from_secs(60));

    let config = RunConfig::from_args(&args(&["--timeout", "2.5"]), &defaults).unwrap();
    assert_eq!(config.default_max_time, Duration::from_millis(2500));
}

#[test]
fn oversized_max_time_saturates_instead_of_panicking() {
    let mut spec = testdag::config::JobSpec::new("forever", "true");
    spec.max_time = Some(1e30);
    assert_eq!(spec.max_time_or(Duration::from_secs(1)), Duration::MAX);

    spec.max_time = Some(f64::INFINITY);
    assert_eq!(spec.max_time_or(Duration::from_secs(1)), Duration::from_secs(1));
}

#[test]
fn cli_maps_onto_run_config() {
    let config = RunConfig::from_args(
        &args(&[
            "--max-parallel",
            "4",
            "--max-threads",
            "8",
            "-j",
            "16",
            "--re",
            "^solve",
            "--capability",
            "petsc=3.20",
            "--capability",
            "hdf5",
            "--platform",
            "linux",
            "--halt-on-error",
            "--halt-mode",
            "drain",
            "--recover",
        ]),
        &DefaultsSection::default(),
    )
    .unwrap();

    assert_eq!(config.max_parallel, 4);
    assert_eq!(config.max_threads, 8);
    assert_eq!(config.worker_count(), 4, "workers are bounded by process slots");
    assert!(config.name_filter.as_ref().unwrap().is_match("solve_2d"));
    assert!(config.capabilities.contains("petsc"));
    assert!(config.capabilities.contains("hdf5"));
    assert_eq!(config.platform, "linux");
    assert!(config.halt_on_error);
    assert_eq!(config.halt_mode, testdag::config::HaltMode::Drain);
    assert!(config.recover);
}

#[test]
fn bad_cli_values_are_config_errors() {
    let defaults = DefaultsSection::default();
    for bad in [
        vec!["--max-parallel", "0"],
        vec!["--timeout=-1"],
        vec!["--timeout", "1e30"],
        vec!["--re", "("],
        vec!["--capability", "=1"],
    ] {
        match RunConfig::from_args(&args(&bad), &defaults) {
            Err(HarnessError::ConfigError(_)) => {}
            other => panic!("{bad:?}: expected config error, got {other:?}"),
        }
    }
}
