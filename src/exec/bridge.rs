//! Completion bridge: folds worker completions into the history.
//!
//! Completions arrive on a channel and are applied on the UI tick, so the
//! renderer never sees a record change between two reads of the same frame.

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::error::ConsoleError;

use super::format::{format_exception, format_result};
use super::record::{History, RecordId};
use super::signal::RedrawSignal;
use super::worker::Completion;

pub struct CompletionBridge {
    rx: mpsc::UnboundedReceiver<Completion>,
    redraw: RedrawSignal,
}

impl CompletionBridge {
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Completion>, redraw: RedrawSignal) -> Self {
        Self { rx, redraw }
    }

    /// Apply every completion that is already waiting. Never blocks.
    ///
    /// Returns how many records changed.
    pub fn drain(&mut self, history: &mut History) -> Result<usize, ConsoleError> {
        let mut applied = 0;
        loop {
            match self.rx.try_recv() {
                Ok(completion) => {
                    if self.apply(history, completion)?.is_some() {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Empty) => return Ok(applied),
                Err(TryRecvError::Disconnected) => {
                    return Err(ConsoleError::WorkerLost(
                        "completion channel closed".to_string(),
                    ));
                }
            }
        }
    }

    /// Wait for the next completion and apply it.
    pub async fn next(&mut self, history: &mut History) -> Result<Option<RecordId>, ConsoleError> {
        match self.rx.recv().await {
            Some(completion) => self.apply(history, completion),
            None => Err(ConsoleError::WorkerLost(
                "completion channel closed".to_string(),
            )),
        }
    }

    fn apply(
        &self,
        history: &mut History,
        completion: Completion,
    ) -> Result<Option<RecordId>, ConsoleError> {
        let applied = apply_completion(history, completion)?;
        if applied.is_some() {
            self.redraw.request();
        }
        Ok(applied)
    }
}

/// Merge one completion into its record.
///
/// Returns the id of the record that changed, or `None` when the record has
/// already been retired from the history.
pub fn apply_completion(
    history: &mut History,
    completion: Completion,
) -> Result<Option<RecordId>, ConsoleError> {
    let id = match completion {
        Completion::WorkerFailed { message } => {
            tracing::error!("worker loop failed: {message}");
            return Err(ConsoleError::WorkerLost(message));
        }
        Completion::Cancelled { id } => {
            let Some(record) = history.get_mut(id) else {
                tracing::debug!(id, "cancelled record already retired");
                return Ok(None);
            };
            record.mark_cancelled();
            id
        }
        Completion::Finished {
            id,
            outcome,
            elapsed,
        } => {
            let Some(record) = history.get_mut(id) else {
                tracing::debug!(id, "completed record already retired");
                return Ok(None);
            };
            match outcome.result {
                Ok(value) => {
                    let formatted = value.map(|snapshot| {
                        let formatted = format_result(&snapshot);
                        (snapshot, formatted)
                    });
                    record.mark_completed(outcome.stdout, outcome.stderr, formatted, elapsed);
                }
                Err(err) => {
                    let formatted = format_exception(&err);
                    record.mark_failed(outcome.stdout, outcome.stderr, formatted, elapsed);
                }
            }
            id
        }
    };
    history.touch();
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::exec::record::{
        ExecutionHandle, ExecutionRecord, GuestError, GuestErrorKind, Outcome, RecordStatus,
        ResultSnapshot,
    };

    fn history_with(ids: &[RecordId]) -> History {
        let mut history = History::new(16);
        for id in ids {
            history.push(ExecutionRecord::pending(
                format!("s{id}"),
                ExecutionHandle::new(*id),
            ));
        }
        history
    }

    fn finished(id: RecordId, result: Result<Option<ResultSnapshot>, GuestError>) -> Completion {
        Completion::Finished {
            id,
            outcome: Outcome {
                stdout: format!("out{id}"),
                stderr: String::new(),
                result,
            },
            elapsed: Duration::from_millis(5),
        }
    }

    fn int(value: i64) -> ResultSnapshot {
        ResultSnapshot {
            repr: value.to_string(),
            type_name: "int".to_string(),
            json: Some(serde_json::json!(value)),
        }
    }

    #[test]
    fn out_of_order_completion_keeps_row_order() {
        let mut history = history_with(&[1, 2]);
        apply_completion(&mut history, finished(2, Ok(Some(int(2))))).expect("apply");
        assert!(history.get(1).expect("row 1").is_pending());
        assert_eq!(history.get(2).expect("row 2").result_text(), Some("2"));

        apply_completion(&mut history, finished(1, Ok(Some(int(1))))).expect("apply");
        let ids: Vec<_> = history.iter().map(ExecutionRecord::id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(history.pending_count(), 0);
    }

    #[test]
    fn failure_sets_exception_and_keeps_partial_output() {
        let mut history = history_with(&[1]);
        let err = GuestError::new(GuestErrorKind::Evaluation, "fail: boom");
        apply_completion(&mut history, finished(1, Err(err))).expect("apply");
        let record = history.get(1).expect("row");
        assert_eq!(record.status(), RecordStatus::Failed);
        assert!(record.result_text().is_none());
        assert!(record.exception_text().expect("exception").contains("boom"));
        assert_eq!(record.stdout_capture(), "out1");
    }

    #[test]
    fn none_result_completes_without_result_text() {
        let mut history = history_with(&[1]);
        apply_completion(&mut history, finished(1, Ok(None))).expect("apply");
        let record = history.get(1).expect("row");
        assert_eq!(record.status(), RecordStatus::Completed);
        assert!(record.result_text().is_none());
        assert!(record.exception_text().is_none());
    }

    #[test]
    fn cancelled_records_get_no_result() {
        let mut history = history_with(&[1]);
        apply_completion(&mut history, Completion::Cancelled { id: 1 }).expect("apply");
        let record = history.get(1).expect("row");
        assert_eq!(record.status(), RecordStatus::Cancelled);
        assert!(record.result_text().is_none());
        assert!(record.exception_text().is_none());
    }

    #[test]
    fn retired_records_are_skipped() {
        let mut history = history_with(&[]);
        let applied = apply_completion(&mut history, finished(9, Ok(None))).expect("apply");
        assert_eq!(applied, None);
    }

    #[test]
    fn worker_failure_is_fatal() {
        let mut history = history_with(&[1]);
        let err = apply_completion(
            &mut history,
            Completion::WorkerFailed {
                message: "runtime".to_string(),
            },
        )
        .expect_err("fatal");
        assert!(err.is_fatal());
    }

    #[test]
    fn drain_applies_everything_and_requests_one_redraw() {
        let (tx, rx) = mpsc::unbounded_channel();
        let redraw = RedrawSignal::new();
        let mut bridge = CompletionBridge::new(rx, redraw.clone());
        let mut history = history_with(&[1, 2]);
        tx.send(finished(1, Ok(Some(int(1))))).expect("send");
        tx.send(finished(2, Ok(None))).expect("send");

        assert_eq!(bridge.drain(&mut history).expect("drain"), 2);
        assert!(redraw.take());
        assert!(!redraw.take());
        assert_eq!(bridge.drain(&mut history).expect("drain"), 0);

        drop(tx);
        assert!(bridge.drain(&mut history).is_err());
    }
}
