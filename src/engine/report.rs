// src/engine/report.rs

//! Final per-job results of a run and their plain-text rendering.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::dag::Status;

/// Width the job name is padded to with dots.
const NAME_COLUMN: usize = 40;

/// Result of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub status: Status,
    /// Summed over all attempts.
    pub elapsed: Duration,
    pub message: Option<String>,
    pub attempts: u32,
    /// Not shown unless extra info is requested.
    pub silent: bool,
    pub output: String,
}

impl ReportEntry {
    /// Message if one was recorded, otherwise the status reason.
    pub fn detail(&self) -> Option<&str> {
        self.message.as_deref().or_else(|| self.status.reason())
    }
}

/// Report printer switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Print captured output of failing jobs.
    pub verbose: bool,
    /// Print elapsed time for passing jobs too.
    pub timing: bool,
    /// Show silent skips.
    pub extra_info: bool,
}

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    /// Jobs that never reached a terminal state.
    pub unfinished: usize,
}

/// Mapping from job name to its result, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    entries: BTreeMap<String, ReportEntry>,
}

impl RunReport {
    pub fn new(entries: BTreeMap<String, ReportEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ReportEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.get(name)
    }

    pub fn status_of(&self, name: &str) -> Option<&Status> {
        self.entries.get(name).map(|e| &e.status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for entry in self.entries.values() {
            match entry.status {
                Status::Success => summary.passed += 1,
                Status::Fail(_) => summary.failed += 1,
                Status::Timeout => summary.timed_out += 1,
                Status::Skip(_) => summary.skipped += 1,
                _ => summary.unfinished += 1,
            }
        }
        summary
    }

    /// `1` if any job failed or timed out, else `0`. Skips never fail a run.
    pub fn exit_code(&self) -> i32 {
        if self.entries.values().any(|e| e.status.is_failure()) {
            1
        } else {
            0
        }
    }

    /// Plain-text report: one line per job then a summary line.
    pub fn render(&self, options: &RenderOptions) -> String {
        let mut out = String::new();

        for (name, entry) in &self.entries {
            if entry.silent && !options.extra_info {
                continue;
            }

            let dots = NAME_COLUMN.saturating_sub(name.len()).max(3);
            let _ = write!(out, "{name} {} {}", ".".repeat(dots), entry.status.label());

            if let Some(detail) = entry.detail() {
                let _ = write!(out, " [{detail}]");
            }
            if entry.attempts > 1 {
                let _ = write!(out, " after {} attempts", entry.attempts);
            }
            let show_time = entry.status.is_failure() || (options.timing && entry.status.is_success());
            if show_time {
                let _ = write!(out, " ({:.2}s)", entry.elapsed.as_secs_f64());
            }
            out.push('\n');

            if options.verbose && entry.status.is_failure() && !entry.output.is_empty() {
                for line in entry.output.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }

        let s = self.summary();
        let _ = write!(
            out,
            "{} passed, {} failed, {} timed out, {} skipped",
            s.passed, s.failed, s.timed_out, s.skipped
        );
        if s.unfinished > 0 {
            let _ = write!(out, ", {} unfinished", s.unfinished);
        }
        out.push('\n');
        out
    }
}
