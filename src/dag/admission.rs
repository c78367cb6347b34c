// src/dag/admission.rs

//! Decides, before anything runs, whether a job takes part in this run.

use std::env;
use std::path::Path;

use tracing::debug;

use crate::capability::{self, CapabilityExpr, Capabilities};
use crate::config::model::{FILTER_ALL, JobSpec};
use crate::config::RunConfig;
use crate::dag::status::{CAPABILITY_MISMATCH, HEAVY, NOT_HEAVY, NOT_SELECTED};
use crate::resources::Reservation;

/// Admission decision for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Run,
    Skip {
        reason: String,
        /// Hidden from the report unless extra info is requested.
        silent: bool,
        /// Left out of the run altogether; dependents do not wait on it.
        excluded: bool,
    },
}

impl Admission {
    fn skip(reason: impl Into<String>) -> Self {
        Admission::Skip {
            reason: reason.into(),
            silent: false,
            excluded: false,
        }
    }

    fn silent(reason: impl Into<String>) -> Self {
        Admission::Skip {
            reason: reason.into(),
            silent: true,
            excluded: true,
        }
    }
}

/// Apply selection, explicit skips, heavy handling, platform filters,
/// capabilities and runtime preconditions, in that order.
pub fn admit(spec: &JobSpec, reservation: Reservation, config: &RunConfig) -> Admission {
    if !is_selected(spec, config) {
        return Admission::silent(NOT_SELECTED);
    }

    if let Some(reason) = &spec.deleted {
        return Admission::Skip {
            reason: format!("deleted: {reason}"),
            silent: !config.extra_info,
            excluded: true,
        };
    }

    if let Some(reason) = &spec.skip {
        return Admission::skip(reason.clone());
    }

    if !config.all_tests {
        if config.heavy && !spec.heavy {
            return Admission::silent(NOT_HEAVY);
        }
        if !config.heavy && spec.heavy {
            return Admission::skip(HEAVY);
        }
    }

    if !matches_filter(&spec.platform, Some(&config.platform))
        || !matches_filter(&spec.compiler, config.compiler.as_deref())
        || !matches_filter(&spec.method, Some(&config.method))
    {
        debug!(job = %spec.name, "platform/compiler/method filter rejected job");
        return Admission::skip(CAPABILITY_MISMATCH);
    }

    if let Some(expr) = &spec.capabilities {
        let caps = job_capabilities(config, reservation);
        match CapabilityExpr::parse(expr) {
            Ok(parsed) if parsed.eval(&caps) => {}
            Ok(_) => {
                debug!(job = %spec.name, capabilities = %expr, "capability predicate is false");
                return Admission::skip(CAPABILITY_MISMATCH);
            }
            // Validation rejects unparsable expressions before a run starts.
            Err(_) => return Admission::skip(CAPABILITY_MISMATCH),
        }
    }

    if let Some(var) = spec.env_vars.iter().find(|v| env::var_os(v).is_none()) {
        return Admission::skip(format!("env var {var} not set"));
    }
    if let Some(var) = spec.env_vars_not_set.iter().find(|v| env::var_os(v).is_some()) {
        return Admission::skip(format!("env var {var} is set"));
    }

    if let Some(program) = spec.requires.iter().find(|p| !program_available(p)) {
        return Admission::skip(format!("missing required program {program}"));
    }

    Admission::Run
}

/// The run's capabilities plus the per-job values expressions may refer to.
pub fn job_capabilities(config: &RunConfig, reservation: Reservation) -> Capabilities {
    let mut caps = config.capabilities.clone();
    caps.insert(capability::MPI_PROCS, reservation.procs);
    caps.insert(capability::NUM_THREADS, reservation.threads_per_proc);
    caps.insert("platform", config.platform.to_ascii_lowercase());
    caps.insert("method", config.method.to_ascii_lowercase());
    if let Some(compiler) = &config.compiler {
        caps.insert("compiler", compiler.to_ascii_lowercase());
    }
    caps
}

fn is_selected(spec: &JobSpec, config: &RunConfig) -> bool {
    if let Some(re) = &config.name_filter {
        if !re.is_match(&spec.name) {
            return false;
        }
    }
    if let Some(group) = &config.group {
        if !spec.group.iter().any(|g| g.eq_ignore_ascii_case(group)) {
            return false;
        }
    }
    if let Some(group) = &config.not_group {
        if spec.group.iter().any(|g| g.eq_ignore_ascii_case(group)) {
            return false;
        }
    }
    true
}

/// Match a `platform`/`compiler`/`method` list against the run's value.
///
/// `ALL` matches anything, `!X` excludes `X`. If any positive entry is
/// listed, one of them must match. An unknown run value (`None`) passes.
pub fn matches_filter(entries: &[String], value: Option<&str>) -> bool {
    let Some(value) = value else {
        return true;
    };

    let mut has_positive = false;
    let mut positive_hit = false;
    for entry in entries {
        let entry = entry.trim();
        if let Some(negated) = entry.strip_prefix('!') {
            if negated.eq_ignore_ascii_case(value) {
                return false;
            }
        } else {
            has_positive = true;
            if entry.eq_ignore_ascii_case(FILTER_ALL) || entry.eq_ignore_ascii_case(value) {
                positive_hit = true;
            }
        }
    }

    !has_positive || positive_hit
}

/// Whether `program` is an existing path or can be found on `PATH`.
fn program_available(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }

    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}
