// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::report::RunReport;
use crate::engine::worker::{worker_loop, WorkerContext};
use crate::errors::Result;
use crate::evaluate::EvaluatorRegistry;
use crate::exec::JobExecutor;
use crate::resources::ResourcePool;

use super::core::CoreRuntime;
use super::queue::ReadyQueue;
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// Capacity of the worker -> runtime event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives the scheduler in response to `RuntimeEvent`s and owns the worker
/// pool that executes jobs through a `JobExecutor`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics.
pub struct Runtime {
    core: CoreRuntime,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: Arc<dyn JobExecutor>,
    evaluators: Arc<EvaluatorRegistry>,
    pool: Arc<ResourcePool>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        core: CoreRuntime,
        executor: Arc<dyn JobExecutor>,
        evaluators: Arc<EvaluatorRegistry>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let config = core.config();
        let pool = Arc::new(ResourcePool::new(config.max_parallel, config.max_threads));
        Self {
            core,
            event_tx,
            event_rx,
            executor,
            evaluators,
            pool,
        }
    }

    /// Sender for injecting events from outside, e.g. a Ctrl-C handler.
    pub fn event_sender(&self) -> mpsc::Sender<RuntimeEvent> {
        self.event_tx.clone()
    }

    /// The slot pool workers draw from.
    pub fn pool(&self) -> Arc<ResourcePool> {
        Arc::clone(&self.pool)
    }

    /// Main event loop.
    ///
    /// - Spawns the worker pool.
    /// - Seeds the run and feeds every event into the core runtime.
    /// - Executes the commands returned by the core (queue jobs, stop
    ///   dispatch, kill running jobs).
    /// - Returns the report once every job is terminal.
    pub async fn run(mut self) -> Result<RunReport> {
        let options = *self.core.options();
        info!(workers = options.workers, "testdag runtime started");

        let queue = Arc::new(ReadyQueue::new());
        let stop = CancellationToken::new();
        let kill = CancellationToken::new();

        let ctx = Arc::new(WorkerContext {
            queue: Arc::clone(&queue),
            pool: Arc::clone(&self.pool),
            executor: Arc::clone(&self.executor),
            evaluators: Arc::clone(&self.evaluators),
            events: self.event_tx.clone(),
            stop: stop.clone(),
            kill: kill.clone(),
        });

        let mut workers = JoinSet::new();
        for id in 0..options.workers {
            workers.spawn(worker_loop(id, Arc::clone(&ctx)));
        }
        drop(ctx);

        let step = self.core.start();
        let mut finished = execute_commands(step, &queue, &stop, &kill);

        while !finished {
            let mut event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!("runtime event channel closed before the run finished");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            // Feed the event into the pure core and get commands back.
            let ack = event.take_ack();
            let step = self.core.step(event);
            if let Some(ack) = ack {
                // A worker that gave up waiting simply never launches.
                let _ = ack.send(!step.refuses_start());
            }
            finished = execute_commands(step, &queue, &stop, &kill);
        }

        // Release every worker: nothing may start or keep running now.
        queue.close();
        stop.cancel();
        kill.cancel();
        drop(self.event_rx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task ended abnormally");
            }
        }

        let (peak_procs, peak_threads) = self.pool.peak();
        info!(peak_procs, peak_threads, "runtime exiting");

        Ok(self.core.report())
    }
}

/// Execute the commands from one core step. Returns whether the run is
/// over.
fn execute_commands(
    step: CoreStep,
    queue: &ReadyQueue,
    stop: &CancellationToken,
    kill: &CancellationToken,
) -> bool {
    let mut finished = !step.keep_running;

    for command in step.commands {
        match command {
            CoreCommand::Dispatch(jobs) => {
                let names: Vec<_> = jobs.iter().map(|j| j.name.as_str()).collect();
                debug!(?names, "dispatching ready jobs");
                queue.push(jobs);
            }
            CoreCommand::StopDispatch => {
                info!("dispatch stopped");
                stop.cancel();
            }
            CoreCommand::KillRunning => {
                info!("killing running jobs");
                kill.cancel();
            }
            CoreCommand::RefuseStart(name) => {
                debug!(job = %name, "start refused; job was settled while waiting");
            }
            CoreCommand::Finish => {
                debug!("core reported run finished");
                finished = true;
            }
        }
    }

    finished
}
