// src/evaluate/exit_code.rs

use crate::config::model::JobSpec;
use crate::errors::EvaluatorError;
use crate::exec::RawResult;

use super::{ResultEvaluator, Verdict, EXIT_CODE};

/// Passes when the process exited with `expect_exit_code`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitCodeEvaluator;

impl ResultEvaluator for ExitCodeEvaluator {
    fn name(&self) -> &'static str {
        EXIT_CODE
    }

    fn evaluate(&self, spec: &JobSpec, raw: &RawResult) -> Result<Verdict, EvaluatorError> {
        if raw.timed_out {
            return Ok(Verdict::timeout());
        }

        let Some(code) = raw.exit_code else {
            return Ok(Verdict::fail("terminated without exit code"));
        };

        let expected = spec.expect_exit_code;
        if code == expected {
            Ok(Verdict::success())
        } else if expected == 0 {
            Ok(Verdict::fail("nonzero exit").with_message(format!("nonzero exit ({code})")))
        } else {
            Ok(Verdict::fail(format!("EXIT CODE {code} != {expected}")))
        }
    }
}
