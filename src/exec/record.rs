//! Execution records and the submission history.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use ratatui::text::Line;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::format::FormattedOutput;

pub type RecordId = u64;

/// Where the unit of work is, as seen from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Queued,
    Running,
    Finished,
    Cancelled,
}

impl RunState {
    fn to_u8(self) -> u8 {
        match self {
            RunState::Queued => 0,
            RunState::Running => 1,
            RunState::Finished => 2,
            RunState::Cancelled => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Running,
            2 => RunState::Finished,
            3 => RunState::Cancelled,
            _ => RunState::Queued,
        }
    }
}

/// Opaque handle to one submission's unit of work.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    id: RecordId,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl ExecutionHandle {
    #[must_use]
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(RunState::Queued.to_u8())),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: RunState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    /// Ask the unit of work to stop. Queued work is skipped; running work
    /// stops at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state(), RunState::Finished | RunState::Cancelled)
    }
}

/// Thread-safe copy of a returned guest value.
///
/// The value itself lives on the worker heap and cannot leave that thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSnapshot {
    pub repr: String,
    pub type_name: String,
    pub json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestErrorKind {
    Parse,
    Evaluation,
    Cancelled,
    Panic,
}

/// A failure inside guest code, kept as display data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestError {
    pub kind: GuestErrorKind,
    pub message: String,
}

impl GuestError {
    pub fn new(kind: GuestErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// What the worker hands back for one unit of work.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub stdout: String,
    pub stderr: String,
    pub result: Result<Option<ResultSnapshot>, GuestError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// One submission's lifecycle.
///
/// Mutation is restricted to the completion bridge; everything else only
/// reads records.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    input_text: String,
    handle: ExecutionHandle,
    status: RecordStatus,
    submitted_at: Instant,
    elapsed: Option<Duration>,
    pub(super) stdout_capture: String,
    pub(super) stderr_capture: String,
    pub(super) result_text: Option<String>,
    pub(super) result_styled: Vec<Line<'static>>,
    pub(super) result_object: Option<ResultSnapshot>,
    pub(super) exception_text: Option<String>,
    pub(super) exception_styled: Vec<Line<'static>>,
}

impl ExecutionRecord {
    #[must_use]
    pub fn pending(input_text: impl Into<String>, handle: ExecutionHandle) -> Self {
        Self {
            input_text: input_text.into(),
            handle,
            status: RecordStatus::Pending,
            submitted_at: Instant::now(),
            elapsed: None,
            stdout_capture: String::new(),
            stderr_capture: String::new(),
            result_text: None,
            result_styled: Vec::new(),
            result_object: None,
            exception_text: None,
            exception_styled: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> RecordId {
        self.handle.id()
    }

    #[must_use]
    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    #[must_use]
    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }

    /// Time spent so far (pending) or the final run time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.submitted_at.elapsed())
    }

    #[must_use]
    pub fn stdout_capture(&self) -> &str {
        &self.stdout_capture
    }

    #[must_use]
    pub fn stderr_capture(&self) -> &str {
        &self.stderr_capture
    }

    #[must_use]
    pub fn result_text(&self) -> Option<&str> {
        self.result_text.as_deref()
    }

    #[must_use]
    pub fn result_styled(&self) -> &[Line<'static>] {
        &self.result_styled
    }

    #[must_use]
    pub fn result_object(&self) -> Option<&ResultSnapshot> {
        self.result_object.as_ref()
    }

    #[must_use]
    pub fn exception_text(&self) -> Option<&str> {
        self.exception_text.as_deref()
    }

    #[must_use]
    pub fn exception_styled(&self) -> &[Line<'static>] {
        &self.exception_styled
    }

    pub(super) fn mark_completed(
        &mut self,
        stdout: String,
        stderr: String,
        result: Option<(ResultSnapshot, FormattedOutput)>,
        elapsed: Duration,
    ) {
        self.stdout_capture = stdout;
        self.stderr_capture = stderr;
        if let Some((snapshot, formatted)) = result {
            self.result_text = Some(formatted.plain);
            self.result_styled = formatted.styled;
            self.result_object = Some(snapshot);
        }
        self.exception_text = None;
        self.elapsed = Some(elapsed);
        self.status = RecordStatus::Completed;
    }

    pub(super) fn mark_failed(
        &mut self,
        stdout: String,
        stderr: String,
        exception: FormattedOutput,
        elapsed: Duration,
    ) {
        self.stdout_capture = stdout;
        self.stderr_capture = stderr;
        self.result_text = None;
        self.result_styled.clear();
        self.result_object = None;
        self.exception_text = Some(exception.plain);
        self.exception_styled = exception.styled;
        self.elapsed = Some(elapsed);
        self.status = RecordStatus::Failed;
    }

    pub(super) fn mark_cancelled(&mut self) {
        self.elapsed = Some(self.submitted_at.elapsed());
        self.status = RecordStatus::Cancelled;
    }
}

/// Submission-ordered, bounded list of records owned by the UI.
#[derive(Debug)]
pub struct History {
    records: VecDeque<ExecutionRecord>,
    max_records: usize,
    version: u64,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

pub const DEFAULT_MAX_RECORDS: usize = 500;

impl History {
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            records: VecDeque::new(),
            max_records: max_records.max(1),
            version: 0,
        }
    }

    /// Append a record, evicting the oldest ones past the bound.
    pub fn push(&mut self, record: ExecutionRecord) {
        debug_assert!(
            self.records.back().is_none_or(|last| last.id() < record.id()),
            "records must be appended in submission order"
        );
        self.records.push_back(record);
        while self.records.len() > self.max_records {
            if let Some(evicted) = self.records.pop_front() {
                tracing::debug!(id = evicted.id(), "retired execution record");
            }
        }
        self.touch();
    }

    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&ExecutionRecord> {
        let index = self.records.binary_search_by_key(&id, ExecutionRecord::id).ok()?;
        self.records.get(index)
    }

    pub(super) fn get_mut(&mut self, id: RecordId) -> Option<&mut ExecutionRecord> {
        let index = self.records.binary_search_by_key(&id, ExecutionRecord::id).ok()?;
        self.records.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bumped on every change so renderers can cache.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(super) fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }

    /// Handles of everything that has not completed, oldest first.
    #[must_use]
    pub fn unfinished_handles(&self) -> Vec<ExecutionHandle> {
        self.records
            .iter()
            .filter(|r| r.is_pending())
            .map(|r| r.handle().clone())
            .collect()
    }

    /// Most recent record that produced a value.
    #[must_use]
    pub fn last_result(&self) -> Option<&ExecutionRecord> {
        self.records.iter().rev().find(|r| r.result_text.is_some())
    }

    /// Drop finished rows; pending rows stay visible.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(ExecutionRecord::is_pending);
        let removed = before - self.records.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RecordId, text: &str) -> ExecutionRecord {
        ExecutionRecord::pending(text, ExecutionHandle::new(id))
    }

    #[test]
    fn new_records_are_pending_and_queued() {
        let rec = record(1, "1 + 1");
        assert_eq!(rec.status(), RecordStatus::Pending);
        assert_eq!(rec.handle().state(), RunState::Queued);
        assert!(rec.result_text().is_none());
        assert!(rec.exception_text().is_none());
        assert_eq!(rec.input_text(), "1 + 1");
    }

    #[test]
    fn history_keeps_submission_order_and_bound() {
        let mut history = History::new(3);
        for id in 1..=5 {
            history.push(record(id, &format!("s{id}")));
        }
        let ids: Vec<_> = history.iter().map(ExecutionRecord::id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert!(history.get(1).is_none());
        assert_eq!(history.get(4).map(ExecutionRecord::input_text), Some("s4"));
    }

    #[test]
    fn clear_finished_keeps_pending_rows() {
        let mut history = History::new(10);
        history.push(record(1, "a"));
        history.push(record(2, "b"));
        if let Some(rec) = history.get_mut(1) {
            rec.mark_cancelled();
        }
        assert_eq!(history.clear_finished(), 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.pending_count(), 1);
        assert_eq!(history.unfinished_handles()[0].id(), 2);
    }

    #[test]
    fn elapsed_stops_once_the_record_settles() {
        let mut rec = record(1, "sleep(1)");
        rec.mark_cancelled();
        let settled = rec.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(rec.elapsed(), settled);
    }

    #[test]
    fn handle_state_is_visible_through_clones() {
        let handle = ExecutionHandle::new(7);
        let other = handle.clone();
        other.set_state(RunState::Running);
        assert_eq!(handle.state(), RunState::Running);
        handle.cancel();
        assert!(other.is_cancelled());
        assert!(!other.is_finished());
    }
}
