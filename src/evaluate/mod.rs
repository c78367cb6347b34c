// src/evaluate/mod.rs

//! Pass/fail determination for finished jobs.
//!
//! A [`ResultEvaluator`] looks at a job's spec and its [`RawResult`] and
//! returns a [`Verdict`]. Evaluators are registered by name in an
//! [`EvaluatorRegistry`] that is built once per run and shared by all
//! workers.
//!
//! Built-ins:
//! - [`exit_code`]: exit status (and timeout) check.
//! - [`pattern`]: `expect_out` / `absent_out` output matching.
//! - [`existence`]: `expect_files` / `forbid_files` checks.

pub mod existence;
pub mod exit_code;
pub mod pattern;
pub mod registry;

use crate::config::model::JobSpec;
use crate::dag::Status;
use crate::errors::EvaluatorError;
use crate::exec::RawResult;

pub use existence::ExistenceEvaluator;
pub use exit_code::ExitCodeEvaluator;
pub use pattern::PatternEvaluator;
pub use registry::EvaluatorRegistry;

/// Registry name of [`ExitCodeEvaluator`].
pub const EXIT_CODE: &str = "exit_code";
/// Registry name of [`PatternEvaluator`].
pub const PATTERN: &str = "pattern";
/// Registry name of [`ExistenceEvaluator`].
pub const EXISTENCE: &str = "existence";

/// Outcome of one evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: Status,
    pub message: Option<String>,
}

impl Verdict {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            message: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            message: Some(reason.clone()),
            status: Status::Fail(reason),
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: Status::Timeout,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Decides whether a finished job passed.
///
/// Implementations only read the spec and the result. Plugins (mesh or
/// structured-data comparators, for example) implement this trait and are
/// registered under their own name.
pub trait ResultEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, spec: &JobSpec, raw: &RawResult) -> Result<Verdict, EvaluatorError>;
}
