// src/dag/status.rs

//! Job status as seen by the scheduler and the report.

use std::fmt;

/// Skip reason for jobs whose capability predicate or platform, compiler
/// or method filters reject this run.
pub const CAPABILITY_MISMATCH: &str = "capability/platform mismatch";

/// Skip reason for jobs that never ran because the run was halted.
pub const RUN_CANCELLED: &str = "run cancelled";

/// Skip reason for jobs excluded by `--re`, `--group` or `--not-group`.
pub const NOT_SELECTED: &str = "not selected";

/// Skip reason once `--max-fails` has been reached.
pub const MAX_FAILS: &str = "max failures reached";

/// Skip reason for heavy jobs when heavy jobs are not requested.
pub const HEAVY: &str = "heavy";

/// Skip reason for light jobs under `--heavy`.
pub const NOT_HEAVY: &str = "not heavy";

/// Skip reason for a dependent whose direct prereq did not succeed.
pub fn prereq_failed(prereq: &str) -> String {
    format!("prereq {prereq} did not succeed")
}

/// Lifecycle of a job within one run.
///
/// `Pending -> Queued -> Running -> {Success, Fail, Timeout}`; `Skip` may be
/// reached from `Pending` or `Queued`. Terminal states never change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Queued,
    Running,
    Success,
    Fail(String),
    Skip(String),
    Timeout,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::Fail(_) | Status::Skip(_) | Status::Timeout
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }

    /// `Fail` or `Timeout`: the outcomes that make the run exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Fail(_) | Status::Timeout)
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Status::Skip(_))
    }

    /// Short upper-case label used in the report.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Success => "OK",
            Status::Fail(_) => "FAIL",
            Status::Skip(_) => "SKIP",
            Status::Timeout => "TIMEOUT",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Status::Fail(r) | Status::Skip(r) => Some(r.as_str()),
            _ => None,
        }
    }

    /// Ordering used to refuse backwards transitions.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Status::Pending => 0,
            Status::Queued => 1,
            Status::Running => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({reason})", self.label()),
            None => f.write_str(self.label()),
        }
    }
}
