// src/engine/queue.rs

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::dag::ScheduledJob;

/// Jobs whose prereqs are terminal, waiting for a worker.
///
/// Semantics:
/// - Light jobs are always handed out before heavy ones, whatever the push
///   order, so heavy jobs are dispatched last.
/// - Within each class, jobs leave in the order the scheduler queued them.
/// - After [`ReadyQueue::close`], `pop` returns `None` for every caller,
///   even if jobs remain; workers use this to exit.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

#[derive(Debug, Default)]
struct QueueState {
    light: VecDeque<ScheduledJob>,
    heavy: VecDeque<ScheduledJob>,
    closed: bool,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add jobs and wake waiting workers.
    pub fn push(&self, jobs: Vec<ScheduledJob>) {
        if jobs.is_empty() {
            return;
        }
        {
            let mut state = self.lock();
            for job in jobs {
                debug!(job = %job.name, heavy = job.heavy, "job queued");
                if job.heavy {
                    state.heavy.push_back(job);
                } else {
                    state.light.push_back(job);
                }
            }
        }
        self.changed.notify_waiters();
    }

    /// Next job, waiting until one is available. `None` once closed.
    pub async fn pop(&self) -> Option<ScheduledJob> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(job) = state.light.pop_front().or_else(|| state.heavy.pop_front()) {
                    return Some(job);
                }
            }

            notified.await;
        }
    }

    /// Stop handing out jobs and release every waiting worker.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_waiters();
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        state.light.len() + state.heavy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
