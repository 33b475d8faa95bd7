//! Turns an accepted input line into queued work.

use crate::error::ConsoleError;

use super::record::{ExecutionHandle, ExecutionRecord, History, RecordId};
use super::signal::ExitSignal;
use super::worker::{Job, WorkQueue};

const EXIT_COMMANDS: [&str; 4] = ["quit", "quit()", "exit", "exit()"];

/// Result of handing one input to the dispatcher.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// An exit command; termination was requested.
    Exit,
    Submitted(ExecutionHandle),
}

#[must_use]
pub fn is_exit_command(text: &str) -> bool {
    EXIT_COMMANDS.contains(&text.trim())
}

pub struct Dispatcher {
    queue: WorkQueue,
    exit: ExitSignal,
    next_id: RecordId,
}

impl Dispatcher {
    #[must_use]
    pub fn new(queue: WorkQueue, exit: ExitSignal) -> Self {
        Self {
            queue,
            exit,
            next_id: 1,
        }
    }

    /// Accept `text` for execution.
    ///
    /// Runs on the UI task and returns as soon as the job is queued; the
    /// pending record is already in `history` when this returns.
    pub fn submit(
        &mut self,
        text: &str,
        history: &mut History,
    ) -> Result<SubmitOutcome, ConsoleError> {
        if text.trim().is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }
        if is_exit_command(text) {
            tracing::debug!("exit command entered");
            self.exit.request_exit();
            return Ok(SubmitOutcome::Exit);
        }

        let id = self.next_id;
        let handle = ExecutionHandle::new(id);
        let record = ExecutionRecord::pending(text, handle.clone());
        self.queue.enqueue(Job {
            source: text.to_string(),
            handle: handle.clone(),
        })?;
        self.next_id += 1;
        history.push(record);
        tracing::debug!(id, "queued submission");
        Ok(SubmitOutcome::Submitted(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<Job>, ExitSignal) {
        let (tx, rx) = mpsc::unbounded_channel();
        let exit = ExitSignal::new();
        (Dispatcher::new(WorkQueue::new(tx), exit.clone()), rx, exit)
    }

    #[test]
    fn blank_input_creates_nothing() {
        let (mut dispatcher, mut rx, exit) = dispatcher();
        let mut history = History::default();
        for text in ["", "   ", "\n\t"] {
            let outcome = dispatcher.submit(text, &mut history).expect("submit");
            assert!(matches!(outcome, SubmitOutcome::Ignored));
        }
        assert!(history.is_empty());
        assert!(rx.try_recv().is_err());
        assert!(!exit.is_requested());
    }

    #[test]
    fn exit_commands_request_termination_without_a_row() {
        for text in ["exit", "quit", " exit() ", "quit()"] {
            let (mut dispatcher, mut rx, exit) = dispatcher();
            let mut history = History::default();
            let outcome = dispatcher.submit(text, &mut history).expect("submit");
            assert!(matches!(outcome, SubmitOutcome::Exit));
            assert!(exit.is_requested());
            assert!(history.is_empty());
            assert!(rx.try_recv().is_err());
        }
        assert!(!is_exit_command("exit(1)"));
        assert!(!is_exit_command("quitter"));
    }

    #[test]
    fn submissions_are_queued_and_recorded_in_order() {
        let (mut dispatcher, mut rx, _exit) = dispatcher();
        let mut history = History::default();
        dispatcher.submit("1 + 1", &mut history).expect("submit");
        dispatcher.submit("x = 3", &mut history).expect("submit");

        let first = rx.try_recv().expect("first job");
        let second = rx.try_recv().expect("second job");
        assert_eq!(first.source, "1 + 1");
        assert_eq!(second.source, "x = 3");
        assert!(first.handle.id() < second.handle.id());

        let inputs: Vec<_> = history.iter().map(ExecutionRecord::input_text).collect();
        assert_eq!(inputs, vec!["1 + 1", "x = 3"]);
        assert!(history.iter().all(ExecutionRecord::is_pending));
    }

    #[test]
    fn closed_queue_is_fatal_and_leaves_history_untouched() {
        let (mut dispatcher, rx, _exit) = dispatcher();
        drop(rx);
        let mut history = History::default();
        let err = dispatcher
            .submit("1", &mut history)
            .expect_err("worker gone");
        assert!(matches!(err, ConsoleError::WorkerUnavailable));
        assert!(history.is_empty());
    }
}
