// src/evaluate/pattern.rs

use regex::{Regex, RegexBuilder};

use crate::config::model::JobSpec;
use crate::errors::EvaluatorError;
use crate::exec::RawResult;

use super::{ResultEvaluator, Verdict, PATTERN};

/// Compile an output pattern. `^`/`$` match at line boundaries and `.`
/// matches newlines, so a pattern can span several output lines.
pub fn build_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
}

/// Checks `expect_out` (must occur) and `absent_out` (must not occur)
/// against the captured output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternEvaluator;

impl PatternEvaluator {
    fn found(
        &self,
        param: &str,
        pattern: &str,
        literal: bool,
        output: &str,
    ) -> Result<bool, EvaluatorError> {
        if literal {
            return Ok(output.contains(pattern));
        }
        let re = build_regex(pattern).map_err(|e| {
            EvaluatorError::new(PATTERN, format!("invalid `{param}` pattern: {e}"))
        })?;
        Ok(re.is_match(output))
    }
}

impl ResultEvaluator for PatternEvaluator {
    fn name(&self) -> &'static str {
        PATTERN
    }

    fn evaluate(&self, spec: &JobSpec, raw: &RawResult) -> Result<Verdict, EvaluatorError> {
        if let Some(pattern) = &spec.expect_out {
            if !self.found("expect_out", pattern, spec.match_literal, &raw.output)? {
                return Ok(Verdict::fail("pattern not found"));
            }
        }

        if let Some(pattern) = &spec.absent_out {
            if self.found("absent_out", pattern, spec.match_literal, &raw.output)? {
                return Ok(Verdict::fail("unexpected pattern found"));
            }
        }

        Ok(Verdict::success())
    }
}
