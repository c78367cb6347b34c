// src/engine/worker.rs

//! Worker tasks: pull a ready job, hold its slots, run it, evaluate it and
//! report back to the runtime loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledJob;
use crate::engine::{JobOutcome, ReadyQueue, RuntimeEvent};
use crate::evaluate::{EvaluatorRegistry, Verdict};
use crate::exec::JobExecutor;
use crate::resources::ResourcePool;

/// Everything a worker shares with the runtime.
pub struct WorkerContext {
    pub queue: Arc<ReadyQueue>,
    pub pool: Arc<ResourcePool>,
    pub executor: Arc<dyn JobExecutor>,
    pub evaluators: Arc<EvaluatorRegistry>,
    pub events: mpsc::Sender<RuntimeEvent>,
    /// Cancelled when no further job may start.
    pub stop: CancellationToken,
    /// Cancelled when running jobs must be killed.
    pub kill: CancellationToken,
}

/// Pull jobs until the queue closes.
pub async fn worker_loop(id: usize, ctx: Arc<WorkerContext>) {
    debug!(worker = id, "worker started");

    while let Some(job) = ctx.queue.pop().await {
        if ctx.stop.is_cancelled() {
            // The scheduler already marked it skipped when it halted.
            debug!(worker = id, job = %job.name, "dispatch stopped; dropping queued job");
            continue;
        }
        run_one(id, &ctx, job).await;
    }

    debug!(worker = id, "worker exiting");
}

async fn run_one(worker: usize, ctx: &WorkerContext, job: ScheduledJob) {
    let name = job.name.clone();

    let lease = tokio::select! {
        biased;
        _ = ctx.stop.cancelled() => {
            debug!(worker, job = %name, "dispatch stopped while waiting for slots");
            return;
        }
        lease = ctx.pool.lease(job.reservation) => lease,
    };

    let lease = match lease {
        Ok(lease) => lease,
        Err(e) => {
            error!(worker, job = %name, error = %e, "cannot reserve slots");
            let verdict = Verdict::fail(format!("resource error: {e}"));
            send(
                ctx,
                RuntimeEvent::JobStarted {
                    name: name.clone(),
                    started_at: Instant::now(),
                    ack: None,
                },
            )
            .await;
            send(
                ctx,
                RuntimeEvent::JobFinished {
                    name,
                    outcome: JobOutcome {
                        status: verdict.status,
                        message: verdict.message,
                        output: String::new(),
                        elapsed: Duration::ZERO,
                        attempts: 0,
                    },
                },
            )
            .await;
            return;
        }
    };

    if ctx.stop.is_cancelled() {
        return;
    }

    // The run may have halted after the lease was taken; launch only once
    // the scheduler has moved the job to `Running`.
    let (ack_tx, ack_rx) = oneshot::channel();
    send(
        ctx,
        RuntimeEvent::JobStarted {
            name: name.clone(),
            started_at: Instant::now(),
            ack: Some(ack_tx),
        },
    )
    .await;
    if !ack_rx.await.unwrap_or(false) {
        debug!(worker, job = %name, "start refused; not launching");
        return;
    }

    let outcome = run_attempts(worker, ctx, &job).await;
    drop(lease);

    send(ctx, RuntimeEvent::JobFinished { name, outcome }).await;
}

/// Run up to `max_attempts` attempts while holding the slot lease.
///
/// Only `Fail` and `Timeout` are retried, and never once dispatch stopped.
async fn run_attempts(worker: usize, ctx: &WorkerContext, job: &ScheduledJob) -> JobOutcome {
    let mut attempts = 0;
    let mut elapsed = Duration::ZERO;

    loop {
        attempts += 1;
        let attempt_started = Instant::now();

        let result = ctx.executor.run(job.clone(), ctx.kill.child_token()).await;
        let (verdict, output) = match result {
            Ok(raw) => {
                elapsed += raw.elapsed;
                (ctx.evaluators.evaluate_all(&job.spec, &raw), raw.output)
            }
            Err(e) => {
                elapsed += attempt_started.elapsed();
                error!(worker, job = %job.name, attempt = attempts, error = %e, "job launch error");
                (Verdict::fail(format!("launch error: {e}")), String::new())
            }
        };

        let retry = verdict.status.is_failure()
            && attempts < job.max_attempts
            && !ctx.stop.is_cancelled();
        if retry {
            warn!(
                worker,
                job = %job.name,
                attempt = attempts,
                max_attempts = job.max_attempts,
                status = %verdict.status,
                "attempt did not succeed; retrying"
            );
            continue;
        }

        info!(
            worker,
            job = %job.name,
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            status = %verdict.status,
            "job finished"
        );

        return JobOutcome {
            status: verdict.status,
            message: verdict.message,
            output,
            elapsed,
            attempts,
        };
    }
}

async fn send(ctx: &WorkerContext, event: RuntimeEvent) {
    if let Err(e) = ctx.events.send(event).await {
        debug!(error = %e, "runtime event channel closed; dropping event");
    }
}
