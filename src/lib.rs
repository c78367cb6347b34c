// src/lib.rs

pub mod capability;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod evaluate;
pub mod exec;
pub mod logging;
pub mod resources;

use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::model::JobSpec;
use crate::config::{load_suite, RunConfig};
use crate::dag::{Admission, Scheduler};
use crate::engine::{CoreRuntime, RenderOptions, RunReport, Runtime, RuntimeEvent};
use crate::errors::Result;
use crate::evaluate::EvaluatorRegistry;
use crate::exec::{JobExecutor, ProcessExecutor};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - suite loading and run configuration
/// - validation and the scheduler
/// - the worker runtime with the process executor
/// - Ctrl-C handling
/// - report printing
pub async fn run(args: CliArgs) -> Result<i32> {
    let suite = load_suite(&args.suite)?;
    let config = RunConfig::from_args(&args, &suite.defaults)?;
    let evaluators = EvaluatorRegistry::with_builtins();

    info!(
        suite = %suite.path.display(),
        jobs = suite.jobs.len(),
        max_parallel = config.max_parallel,
        max_threads = config.max_threads,
        "suite loaded"
    );

    let scheduler = Scheduler::new(suite.jobs, &config, &evaluators)?;

    if config.dry_run {
        print!("{}", render_plan(&scheduler));
        return Ok(0);
    }

    let executor: Arc<dyn JobExecutor> = Arc::new(ProcessExecutor::new(config.max_output_bytes));
    let runtime = Runtime::new(
        CoreRuntime::from_scheduler(scheduler),
        executor,
        Arc::new(evaluators),
    );

    // Ctrl-C -> cancel the run.
    {
        let tx = runtime.event_sender();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let report = runtime.run().await?;

    let options = RenderOptions {
        verbose: config.verbose,
        timing: config.timing,
        extra_info: config.extra_info,
    };
    print!("{}", report.render(&options));

    Ok(report.exit_code())
}

/// Validate and run `specs` to completion with the given executor.
///
/// Used by embedders and tests that bring their own executor or evaluators.
pub async fn execute(
    specs: Vec<JobSpec>,
    config: &RunConfig,
    executor: Arc<dyn JobExecutor>,
    evaluators: Arc<EvaluatorRegistry>,
) -> Result<RunReport> {
    let scheduler = Scheduler::new(specs, config, &evaluators)?;
    let runtime = Runtime::new(CoreRuntime::from_scheduler(scheduler), executor, evaluators);
    runtime.run().await
}

/// `--dry-run` output: jobs in dispatch order with prereqs, slots and
/// whether they would run.
pub fn render_plan(scheduler: &Scheduler) -> String {
    let mut out = String::from("testdag dry-run\n");
    let config = scheduler.config();
    out.push_str(&format!(
        "  pool: {} process slot(s), {} thread slot(s), {} worker(s)\n\n",
        config.max_parallel,
        config.max_threads,
        config.worker_count()
    ));

    let plan = scheduler.plan();
    out.push_str(&format!("jobs ({}):\n", plan.len()));
    for entry in plan {
        let decision = match &entry.admission {
            Admission::Run => "run".to_string(),
            Admission::Skip { reason, .. } => format!("skip ({reason})"),
        };
        out.push_str(&format!("  - {}: {decision}\n", entry.name));
        if let Some(job) = scheduler.job(&entry.name) {
            out.push_str(&format!("      command: {}\n", job.spec.command));
        }
        out.push_str(&format!(
            "      slots: {} proc(s) x {} thread(s)\n",
            entry.reservation.procs, entry.reservation.threads_per_proc
        ));
        if !entry.prereqs.is_empty() {
            out.push_str(&format!("      prereq: {:?}\n", entry.prereqs));
        }
    }

    debug!("dry-run complete (no execution)");
    out
}
