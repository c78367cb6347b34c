// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::config::model::{DefaultsSection, JobSpec, SuiteFile};
use crate::errors::Result;

/// A suite file after loading: defaults plus jobs with resolved paths.
#[derive(Debug, Clone)]
pub struct Suite {
    pub path: PathBuf,
    pub defaults: DefaultsSection,
    pub jobs: Vec<JobSpec>,
}

/// Load a suite file from a given path and return the raw `SuiteFile`.
///
/// This only performs TOML deserialization; it does **not** perform
/// semantic validation (graph correctness, etc.). That happens when the
/// scheduler is built, where all problems are reported together.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<SuiteFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading suite file '{}'", path.display()))?;

    let suite: SuiteFile = toml::from_str(&contents)?;

    Ok(suite)
}

/// Load a suite and resolve each job's working directory.
///
/// Relative `working_directory` values resolve against the suite file's
/// directory; jobs without one run there.
pub fn load_suite(path: impl AsRef<Path>) -> Result<Suite> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let root = suite_root_dir(path);

    let jobs: Vec<JobSpec> = raw
        .test
        .into_iter()
        .map(|mut job| {
            job.working_directory = Some(match job.working_directory.take() {
                Some(dir) if dir.is_absolute() => dir,
                Some(dir) => root.join(dir),
                None => root.clone(),
            });
            job
        })
        .collect();

    debug!(suite = %path.display(), jobs = jobs.len(), "suite loaded");

    Ok(Suite {
        path: path.to_path_buf(),
        defaults: raw.defaults,
        jobs,
    })
}

/// Figure out the directory jobs run in by default.
///
/// - If the suite path has a non-empty parent (e.g. "tests/suite.toml"),
///   we use that directory.
/// - If it's just a bare filename like "tests.toml" (parent = ""),
///   we fall back to the current working directory.
pub fn suite_root_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
