//! Handle tying the worker, dispatcher and completion bridge together.
//!
//! The UI owns one `Console` and talks to guest code only through it:
//! - `submit` queues text and returns at once
//! - `drain` folds finished work into the history on each tick
//! - `shutdown` cancels what is left at teardown

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::ConsoleError;

use super::bridge::CompletionBridge;
use super::dispatcher::{Dispatcher, SubmitOutcome};
use super::record::{ExecutionRecord, History, RecordId};
use super::signal::{ExitSignal, RedrawSignal};
use super::worker::{WorkerConfig, WorkerLoop};

pub struct Console {
    worker: WorkerLoop,
    dispatcher: Dispatcher,
    bridge: CompletionBridge,
    exit: ExitSignal,
    redraw: RedrawSignal,
}

impl Console {
    /// Start the worker loop.
    pub fn start(
        config: WorkerConfig,
        redraw: RedrawSignal,
        exit: ExitSignal,
    ) -> Result<Self, ConsoleError> {
        let (tx_completion, rx_completion) = mpsc::unbounded_channel();
        let worker = WorkerLoop::spawn(config, tx_completion, redraw.clone())?;
        let dispatcher = Dispatcher::new(worker.queue(), exit.clone());
        Ok(Self {
            worker,
            dispatcher,
            bridge: CompletionBridge::new(rx_completion, redraw.clone()),
            exit,
            redraw,
        })
    }

    pub fn submit(
        &mut self,
        text: &str,
        history: &mut History,
    ) -> Result<SubmitOutcome, ConsoleError> {
        self.dispatcher.submit(text, history)
    }

    /// Apply finished work to `history`. Never blocks.
    pub fn drain(&mut self, history: &mut History) -> Result<usize, ConsoleError> {
        let applied = self.bridge.drain(history)?;
        if !self.worker.is_alive() && !self.exit.is_requested() {
            // Completions sent before the thread ended were applied above.
            return Err(ConsoleError::WorkerLost(
                "worker thread exited".to_string(),
            ));
        }
        Ok(applied)
    }

    /// Wait until record `id` leaves the pending state.
    pub async fn wait_for<'h>(
        &mut self,
        id: RecordId,
        history: &'h mut History,
    ) -> Result<Option<&'h ExecutionRecord>, ConsoleError> {
        while history.get(id).is_some_and(ExecutionRecord::is_pending) {
            self.bridge.next(history).await?;
        }
        Ok(history.get(id))
    }

    pub fn request_exit(&self) {
        self.exit.request_exit();
    }

    #[must_use]
    pub fn exit_requested(&self) -> bool {
        self.exit.is_requested()
    }

    /// Consume a pending repaint request.
    pub fn take_redraw(&self) -> bool {
        self.redraw.take()
    }

    /// Cancel unfinished submissions and stop the worker.
    ///
    /// Gives in-flight work up to `grace` to observe the cancellation and
    /// applies whatever completes in that window.
    pub async fn shutdown(&mut self, history: &mut History, grace: Duration) {
        let unfinished = history.unfinished_handles();
        for handle in &unfinished {
            handle.cancel();
        }
        self.worker.shutdown();
        if unfinished.is_empty() {
            return;
        }

        let settle = async {
            while history.pending_count() > 0 {
                if self.bridge.next(history).await.is_err() {
                    break;
                }
            }
        };
        if tokio::time::timeout(grace, settle).await.is_err() {
            tracing::debug!(
                pending = history.pending_count(),
                "worker still busy at shutdown"
            );
        }
    }
}
