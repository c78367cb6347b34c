// src/evaluate/existence.rs

use std::path::{Path, PathBuf};

use crate::config::model::JobSpec;
use crate::errors::EvaluatorError;
use crate::exec::RawResult;

use super::{ResultEvaluator, Verdict, EXISTENCE};

/// Checks that `expect_files` exist and `forbid_files` do not, after the
/// run. Relative paths resolve against the job's working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistenceEvaluator;

fn resolve(spec: &JobSpec, path: &Path) -> PathBuf {
    match &spec.working_directory {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

impl ResultEvaluator for ExistenceEvaluator {
    fn name(&self) -> &'static str {
        EXISTENCE
    }

    fn evaluate(&self, spec: &JobSpec, _raw: &RawResult) -> Result<Verdict, EvaluatorError> {
        let missing: Vec<String> = spec
            .expect_files
            .iter()
            .filter(|p| !resolve(spec, p).exists())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Ok(Verdict::fail(format!("missing file(s): {}", missing.join(", "))));
        }

        let present: Vec<String> = spec
            .forbid_files
            .iter()
            .filter(|p| resolve(spec, p).exists())
            .map(|p| p.display().to_string())
            .collect();
        if !present.is_empty() {
            return Ok(Verdict::fail(format!(
                "forbidden file(s) present: {}",
                present.join(", ")
            )));
        }

        Ok(Verdict::success())
    }
}
