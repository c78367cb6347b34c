// src/config/validate.rs

use std::time::Duration;

use crate::capability::CapabilityExpr;
use crate::config::model::JobSpec;
use crate::config::RunConfig;
use crate::dag::graph::DependencyGraph;
use crate::errors::{SpecError, SpecErrors};
use crate::evaluate::pattern::build_regex;
use crate::evaluate::EvaluatorRegistry;

/// Check a job set before anything runs and build its graph.
///
/// Every problem is collected; nothing short-circuits. Checks:
/// - structure: duplicate names, unknown or self prereqs, `ALL` misuse
/// - cycles
/// - resource bounds and capacity against the run's pools
/// - capability expressions and output patterns parse
/// - every evaluator a job names is registered
pub fn validate_jobs(
    specs: &[JobSpec],
    config: &RunConfig,
    evaluators: &EvaluatorRegistry,
) -> Result<DependencyGraph, SpecErrors> {
    let mut errors = SpecErrors::new();

    let graph = match DependencyGraph::build(specs) {
        Ok(graph) => {
            let cycle = graph.detect_cycles();
            if !cycle.is_empty() {
                errors.push(SpecError::Cycle(cycle));
            }
            Some(graph)
        }
        Err(structural) => {
            errors.extend(structural);
            None
        }
    };

    for spec in specs {
        validate_job(spec, config, evaluators, &mut errors);
    }

    errors.into_result()?;
    // A clean error list implies the graph was built.
    graph.ok_or_else(SpecErrors::new)
}

fn validate_job(
    spec: &JobSpec,
    config: &RunConfig,
    evaluators: &EvaluatorRegistry,
    errors: &mut SpecErrors,
) {
    if spec.command.trim().is_empty() {
        errors.push(SpecError::EmptyCommand(spec.name.clone()));
    }

    if let Some(reason) = resource_bounds_problem(spec) {
        errors.push(SpecError::InvalidResources {
            job: spec.name.clone(),
            reason,
        });
    } else {
        let reservation = spec.reservation(config.procs, config.nthreads);
        let threads = reservation.thread_slots();
        if reservation.procs > config.max_parallel || threads > config.max_threads {
            errors.push(SpecError::ExceedsCapacity {
                job: spec.name.clone(),
                procs: reservation.procs,
                threads,
                max_procs: config.max_parallel,
                max_threads: config.max_threads,
            });
        }
    }

    if let Some(expr) = &spec.capabilities {
        if let Err(e) = CapabilityExpr::parse(expr) {
            errors.push(SpecError::InvalidCapability {
                job: spec.name.clone(),
                reason: e.to_string(),
            });
        }
    }

    if !spec.match_literal {
        for (param, pattern) in [("expect_out", &spec.expect_out), ("absent_out", &spec.absent_out)] {
            if let Some(pattern) = pattern {
                if let Err(e) = build_regex(pattern) {
                    errors.push(SpecError::InvalidPattern {
                        job: spec.name.clone(),
                        param,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    for name in spec.effective_evaluators() {
        if !evaluators.contains(&name) {
            errors.push(SpecError::UnknownEvaluator {
                job: spec.name.clone(),
                evaluator: name,
            });
        }
    }
}

fn resource_bounds_problem(spec: &JobSpec) -> Option<String> {
    if spec.min_parallel == 0 || spec.min_threads == 0 {
        return Some("min_parallel and min_threads must be >= 1".to_string());
    }
    if spec.min_parallel > spec.max_parallel {
        return Some(format!(
            "min_parallel ({}) > max_parallel ({})",
            spec.min_parallel, spec.max_parallel
        ));
    }
    if spec.min_threads > spec.max_threads {
        return Some(format!(
            "min_threads ({}) > max_threads ({})",
            spec.min_threads, spec.max_threads
        ));
    }
    if let Some(secs) = spec.max_time {
        if !secs.is_finite() || secs <= 0.0 {
            return Some(format!("max_time must be positive (got {secs})"));
        }
        if Duration::try_from_secs_f64(secs).is_err() {
            return Some(format!("max_time of {secs} seconds is too large"));
        }
    }
    None
}
