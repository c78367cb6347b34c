// src/errors.rs

//! Crate-wide error types.
//!
//! - [`SpecError`] / [`SpecErrors`]: fatal problems with the job set, found
//!   before anything runs. They are always collected, never short-circuited.
//! - [`LaunchError`]: a job's process could not be started.
//! - [`EvaluatorError`]: a result evaluator could not reach a verdict.
//! - [`HarnessError`]: everything that aborts a whole run.

use std::fmt;

use thiserror::Error;

/// A single validation problem in the job set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("duplicate job name '{0}'")]
    DuplicateName(String),

    #[error("job '{job}' has unknown prereq '{prereq}'")]
    UnknownPrereq { job: String, prereq: String },

    #[error("job '{0}' cannot list itself as a prereq")]
    SelfPrereq(String),

    #[error("job '{0}' uses prereq = [\"ALL\"] but another job is named 'ALL'")]
    ReservedAllName(String),

    #[error(
        "jobs {} all use prereq = [\"ALL\"]; at most one job may",
        .0.join(", ")
    )]
    MultiplePrereqAll(Vec<String>),

    #[error("Cyclic or Invalid Dependency Detected: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error(
        "job '{job}' needs {procs} process slot(s) and {threads} thread slot(s), \
         but the pool only has {max_procs} and {max_threads}"
    )]
    ExceedsCapacity {
        job: String,
        procs: u32,
        threads: u32,
        max_procs: u32,
        max_threads: u32,
    },

    #[error("job '{job}' has invalid resource bounds: {reason}")]
    InvalidResources { job: String, reason: String },

    #[error("job '{job}' has an invalid capability expression: {reason}")]
    InvalidCapability { job: String, reason: String },

    #[error("job '{job}' has an invalid `{param}` pattern: {reason}")]
    InvalidPattern {
        job: String,
        param: &'static str,
        reason: String,
    },

    #[error("job '{job}' names unknown evaluator '{evaluator}'")]
    UnknownEvaluator { job: String, evaluator: String },

    #[error("job '{0}' has an empty command")]
    EmptyCommand(String),
}

/// Every validation problem found for a job set, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecErrors(pub Vec<SpecError>);

impl SpecErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: SpecError) {
        self.0.push(err);
    }

    pub fn extend(&mut self, other: SpecErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpecError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> std::result::Result<(), SpecErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for SpecErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SpecErrors {}

impl From<SpecError> for SpecErrors {
    fn from(err: SpecError) -> Self {
        Self(vec![err])
    }
}

/// The job's process could not be started or awaited.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for job process: {0}")]
    Wait(#[source] std::io::Error),
}

/// An evaluator could not produce a verdict.
///
/// The scheduler converts this into `Fail("evaluator error: <message>")`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{evaluator}: {message}")]
pub struct EvaluatorError {
    pub evaluator: String,
    pub message: String,
}

impl EvaluatorError {
    pub fn new(evaluator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            evaluator: evaluator.into(),
            message: message.into(),
        }
    }
}

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("invalid job set:\n{0}")]
    Spec(#[from] SpecErrors),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HarnessError>;
