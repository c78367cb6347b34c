// src/evaluate/registry.rs

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::model::JobSpec;
use crate::dag::status::{Status, RUN_CANCELLED};
use crate::exec::RawResult;

use super::{ExistenceEvaluator, ExitCodeEvaluator, PatternEvaluator, ResultEvaluator, Verdict};

/// Evaluators by name. Built once per run and shared read-only.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: BTreeMap<String, Arc<dyn ResultEvaluator>>,
}

impl fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluatorRegistry")
            .field("names", &self.evaluators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EvaluatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `exit_code`, `pattern` and `existence`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExitCodeEvaluator));
        registry.register(Arc::new(PatternEvaluator));
        registry.register(Arc::new(ExistenceEvaluator));
        registry
    }

    /// Register under the evaluator's own name, replacing any previous one.
    pub fn register(&mut self, evaluator: Arc<dyn ResultEvaluator>) {
        self.evaluators
            .insert(evaluator.name().to_string(), evaluator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ResultEvaluator>> {
        self.evaluators.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.evaluators.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.evaluators.keys().map(|s| s.as_str())
    }

    /// Run the job's evaluators in order and return the first verdict that
    /// is not a success.
    ///
    /// A cancelled result is `Skip("run cancelled")` and a timed-out one is
    /// `Timeout`, before any evaluator runs. Evaluator errors and panics
    /// become `Fail("evaluator error: ...")`.
    pub fn evaluate_all(&self, spec: &JobSpec, raw: &RawResult) -> Verdict {
        if raw.cancelled {
            return Verdict {
                status: Status::Skip(RUN_CANCELLED.to_string()),
                message: Some(RUN_CANCELLED.to_string()),
            };
        }
        if raw.timed_out {
            return Verdict::timeout();
        }

        for name in spec.effective_evaluators() {
            let Some(evaluator) = self.get(&name) else {
                return Verdict::fail(format!("evaluator error: unknown evaluator '{name}'"));
            };

            let verdict = match catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(spec, raw))) {
                Ok(Ok(verdict)) => verdict,
                Ok(Err(e)) => {
                    warn!(job = %spec.name, evaluator = %name, error = %e, "evaluator error");
                    Verdict::fail(format!("evaluator error: {e}"))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(job = %spec.name, evaluator = %name, %message, "evaluator panicked");
                    Verdict::fail(format!("evaluator error: {name} panicked: {message}"))
                }
            };

            debug!(job = %spec.name, evaluator = %name, status = %verdict.status, "evaluated");
            if !verdict.status.is_success() {
                return verdict;
            }
        }

        Verdict::success()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
