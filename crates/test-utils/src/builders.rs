#![allow(dead_code)]

use std::time::Duration;

use testdag::capability::{Capabilities, CapabilityValue};
use testdag::config::{HaltMode, JobSpec, RunConfig};

/// Builder for `JobSpec` to simplify test setup.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            spec: JobSpec::new(name, format!("echo {name}")),
        }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.spec.command = command.to_string();
        self
    }

    pub fn prereq(mut self, dep: &str) -> Self {
        self.spec.prereq.push(dep.to_string());
        self
    }

    pub fn max_time(mut self, secs: f64) -> Self {
        self.spec.max_time = Some(secs);
        self
    }

    pub fn capabilities(mut self, expr: &str) -> Self {
        self.spec.capabilities = Some(expr.to_string());
        self
    }

    pub fn skip(mut self, reason: &str) -> Self {
        self.spec.skip = Some(reason.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.spec.group.push(group.to_string());
        self
    }

    pub fn procs(mut self, min: u32, max: u32) -> Self {
        self.spec.min_parallel = min;
        self.spec.max_parallel = max;
        self
    }

    pub fn threads(mut self, min: u32, max: u32) -> Self {
        self.spec.min_threads = min;
        self.spec.max_threads = max;
        self
    }

    pub fn heavy(mut self) -> Self {
        self.spec.heavy = true;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.spec.retries = n;
        self
    }

    pub fn ignore_prereq_failure(mut self) -> Self {
        self.spec.ignore_prereq_failure = true;
        self
    }

    pub fn expect_out(mut self, pattern: &str) -> Self {
        self.spec.expect_out = Some(pattern.to_string());
        self
    }

    pub fn absent_out(mut self, pattern: &str) -> Self {
        self.spec.absent_out = Some(pattern.to_string());
        self
    }

    pub fn expect_exit_code(mut self, code: i32) -> Self {
        self.spec.expect_exit_code = code;
        self
    }

    pub fn evaluator(mut self, name: &str) -> Self {
        self.spec.evaluators.push(name.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.spec.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

/// Builder for `RunConfig` with small, deterministic defaults: two process
/// slots, two thread slots, two workers and no capabilities.
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RunConfig {
                max_parallel: 2,
                max_threads: 2,
                workers: 2,
                platform: "LINUX".to_string(),
                ..RunConfig::default()
            },
        }
    }

    pub fn slots(mut self, procs: u32, threads: u32) -> Self {
        self.config.max_parallel = procs;
        self.config.max_threads = threads;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn procs(mut self, n: u32) -> Self {
        self.config.procs = n;
        self
    }

    pub fn nthreads(mut self, n: u32) -> Self {
        self.config.nthreads = n;
        self
    }

    pub fn default_max_time(mut self, d: Duration) -> Self {
        self.config.default_max_time = d;
        self
    }

    pub fn capability(mut self, name: &str, value: impl Into<CapabilityValue>) -> Self {
        self.config.capabilities.insert(name, value.into());
        self
    }

    pub fn capabilities(mut self, caps: Capabilities) -> Self {
        self.config.capabilities = caps;
        self
    }

    pub fn recover(mut self) -> Self {
        self.config.recover = true;
        self
    }

    pub fn halt_on_error(mut self, mode: HaltMode) -> Self {
        self.config.halt_on_error = true;
        self.config.halt_mode = mode;
        self
    }

    pub fn max_fails(mut self, n: usize) -> Self {
        self.config.max_fails = n;
        self
    }

    pub fn heavy(mut self) -> Self {
        self.config.heavy = true;
        self
    }

    pub fn all_tests(mut self) -> Self {
        self.config.all_tests = true;
        self
    }

    pub fn name_filter(mut self, re: &str) -> Self {
        self.config.name_filter = Some(regex::Regex::new(re).expect("valid test regex"));
        self
    }

    pub fn extra_info(mut self) -> Self {
        self.config.extra_info = true;
        self
    }

    pub fn build(self) -> RunConfig {
        self.config
    }
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
