//! Worker loop for guest code.
//!
//! One dedicated thread owns the binding environment and a FIFO job queue.
//! The UI talks to it only through the queue and the completion channel:
//! - jobs go in through `WorkQueue::enqueue` (never blocks)
//! - results come back as `Completion` messages
//! - a redraw is requested after every state change

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ConsoleError;

use super::bindings::{Bindings, GuestContext, SeedValue};
use super::capture::OutputStreams;
use super::record::{ExecutionHandle, GuestError, GuestErrorKind, Outcome, RecordId, RunState};
use super::signal::RedrawSignal;

const WORKER_THREAD_NAME: &str = "console-worker";

/// One unit of guest work.
#[derive(Debug)]
pub struct Job {
    pub source: String,
    pub handle: ExecutionHandle,
}

/// Messages posted from the worker back to the UI.
#[derive(Debug)]
pub enum Completion {
    Finished {
        id: RecordId,
        outcome: Outcome,
        elapsed: Duration,
    },
    Cancelled {
        id: RecordId,
    },
    /// The loop's own machinery failed; nothing after this will run.
    WorkerFailed {
        message: String,
    },
}

/// Configuration for the worker loop.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub seed: BTreeMap<String, SeedValue>,
}

/// Thread-safe enqueue side of the worker queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl WorkQueue {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Job>) -> Self {
        Self { tx }
    }

    pub fn enqueue(&self, job: Job) -> Result<(), ConsoleError> {
        self.tx
            .send(job)
            .map_err(|_| ConsoleError::WorkerUnavailable)
    }
}

/// The single worker loop of the console.
pub struct WorkerLoop {
    queue: WorkQueue,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl WorkerLoop {
    /// Start the worker thread.
    pub fn spawn(
        config: WorkerConfig,
        completions: mpsc::UnboundedSender<Completion>,
        redraw: RedrawSignal,
    ) -> Result<Self, ConsoleError> {
        let (tx_job, rx_job) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let thread_shutdown = shutdown.clone();

        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_thread_main(config, rx_job, completions, redraw, thread_shutdown))
            .map_err(ConsoleError::WorkerSpawn)?;

        tracing::debug!("worker loop started");
        Ok(Self {
            queue: WorkQueue::new(tx_job),
            shutdown,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn queue(&self) -> WorkQueue {
        self.queue.clone()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop accepting work and cancel whatever is still queued.
    ///
    /// The thread is not joined: an in-flight job that never reaches a
    /// suspension point keeps running until it returns on its own.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take()
            && thread.is_finished()
        {
            let _ = thread.join();
        }
    }
}

impl Drop for WorkerLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_thread_main(
    config: WorkerConfig,
    rx_job: mpsc::UnboundedReceiver<Job>,
    completions: mpsc::UnboundedSender<Completion>,
    redraw: RedrawSignal,
    shutdown: CancellationToken,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("worker runtime failed to start: {err}");
            let _ = completions.send(Completion::WorkerFailed {
                message: err.to_string(),
            });
            redraw.request();
            return;
        }
    };

    let worker = Worker {
        bindings: Bindings::new(&config.seed),
        streams: Rc::new(OutputStreams::new()),
        rx_job,
        completions,
        redraw,
        shutdown,
    };
    runtime.block_on(worker.run());
    tracing::debug!("worker loop stopped");
}

struct Worker {
    bindings: Bindings,
    streams: Rc<OutputStreams>,
    rx_job: mpsc::UnboundedReceiver<Job>,
    completions: mpsc::UnboundedSender<Completion>,
    redraw: RedrawSignal,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let job = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                job = self.rx_job.recv() => job,
            };
            let Some(job) = job else {
                break;
            };
            if job.handle.is_cancelled() {
                self.report_cancelled(&job.handle);
                continue;
            }
            self.run_job(job);
            tokio::task::yield_now().await;
        }

        self.rx_job.close();
        while let Ok(job) = self.rx_job.try_recv() {
            job.handle.cancel();
            self.report_cancelled(&job.handle);
        }
    }

    fn report_cancelled(&self, handle: &ExecutionHandle) {
        handle.set_state(RunState::Cancelled);
        let _ = self.completions.send(Completion::Cancelled { id: handle.id() });
        self.redraw.request();
    }

    fn run_job(&self, job: Job) {
        let Job { source, handle } = job;
        let id = handle.id();
        handle.set_state(RunState::Running);
        self.redraw.request();
        tracing::debug!(id, "running submission");

        let started = Instant::now();
        let outcome = self.execute(&source, handle.cancel_token().clone());
        let elapsed = started.elapsed();

        if let Err(err) = &outcome.result {
            tracing::debug!(id, kind = ?err.kind, "submission failed");
        }
        handle.set_state(RunState::Finished);
        if self
            .completions
            .send(Completion::Finished {
                id,
                outcome,
                elapsed,
            })
            .is_err()
        {
            tracing::debug!(id, "completion dropped: UI is gone");
        }
        self.redraw.request();
    }

    /// Run one submission inside a capture window.
    fn execute(&self, source: &str, cancel: CancellationToken) -> Outcome {
        let guard = match self.streams.begin_capture() {
            Ok(guard) => guard,
            Err(err) => {
                return Outcome {
                    stdout: String::new(),
                    stderr: String::new(),
                    result: Err(GuestError::new(GuestErrorKind::Panic, err.to_string())),
                };
            }
        };

        let guest = GuestContext::new(Rc::clone(&self.streams), cancel);
        let result = catch_unwind(AssertUnwindSafe(|| self.bindings.evaluate(source, &guest)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!("guest evaluation panicked: {message}");
                Err(GuestError::new(GuestErrorKind::Panic, message))
            });

        let captured = guard.finish();
        debug_assert!(!self.streams.is_capturing() && self.streams.at_defaults());
        Outcome {
            stdout: captured.stdout,
            stderr: captured.stderr,
            result,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "evaluation panicked".to_string()
    }
}
