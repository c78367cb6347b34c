use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use testdag::dag::ScheduledJob;
use testdag::errors::LaunchError;
use testdag::exec::{JobExecutor, JobFuture, RawResult};
use tokio_util::sync::CancellationToken;

/// What one scripted attempt of a job does.
#[derive(Debug, Clone)]
pub struct FakeAttempt {
    pub exit_code: i32,
    pub output: String,
    pub delay: Duration,
    pub launch_error: bool,
}

impl FakeAttempt {
    pub fn ok() -> Self {
        Self {
            exit_code: 0,
            output: String::new(),
            delay: Duration::ZERO,
            launch_error: false,
        }
    }

    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::ok()
        }
    }

    pub fn launch_error() -> Self {
        Self {
            launch_error: true,
            ..Self::ok()
        }
    }

    pub fn output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    /// Per-job queue of attempts; the last one repeats once the queue is
    /// down to a single entry.
    scripts: HashMap<String, VecDeque<FakeAttempt>>,
    started: Vec<String>,
    finished: Vec<String>,
    running: usize,
    max_running: usize,
    attempts: HashMap<String, u32>,
}

/// A fake executor that:
/// - plays back scripted attempts per job (default: immediate success)
/// - records start and finish order and the peak number of concurrent jobs
/// - honours the cancellation token and `max_time` like the real runner
#[derive(Debug, Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<FakeState>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt of `name` behaves like `attempt`.
    pub fn script(self, name: &str, attempt: FakeAttempt) -> Self {
        self.script_attempts(name, vec![attempt])
    }

    /// Attempts of `name` behave like `attempts` in order; the last one
    /// repeats.
    pub fn script_attempts(self, name: &str, attempts: Vec<FakeAttempt>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(name.to_string(), attempts.into());
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.state.lock().unwrap().finished.clone()
    }

    pub fn max_running(&self) -> usize {
        self.state.lock().unwrap().max_running
    }

    pub fn attempts_of(&self, name: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .attempts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    fn next_attempt(&self, name: &str) -> FakeAttempt {
        let mut state = self.state.lock().unwrap();
        *state.attempts.entry(name.to_string()).or_insert(0) += 1;
        match state.scripts.get_mut(name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(FakeAttempt::ok),
            Some(queue) => queue.front().cloned().unwrap_or_else(FakeAttempt::ok),
            None => FakeAttempt::ok(),
        }
    }

    fn begin(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.started.push(name.to_string());
        state.running += 1;
        state.max_running = state.max_running.max(state.running);
    }

    fn end(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.finished.push(name.to_string());
        state.running -= 1;
    }
}

impl JobExecutor for FakeExecutor {
    fn run(&self, job: ScheduledJob, cancel: CancellationToken) -> JobFuture<'_> {
        Box::pin(async move {
            let attempt = self.next_attempt(&job.name);
            if attempt.launch_error {
                return Err(LaunchError::Spawn {
                    command: job.command.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
                });
            }

            self.begin(&job.name);
            let started = Instant::now();
            let limit = attempt.delay.min(job.max_time);
            let timed_out = attempt.delay > job.max_time;

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(limit) => false,
                _ = cancel.cancelled() => true,
            };
            self.end(&job.name);

            let finished_normally = !cancelled && !timed_out;
            Ok(RawResult {
                exit_code: finished_normally.then_some(attempt.exit_code),
                output: attempt.output,
                elapsed: started.elapsed(),
                timed_out: !cancelled && timed_out,
                cancelled,
            })
        })
    }
}
