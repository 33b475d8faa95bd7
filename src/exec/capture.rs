//! Output capture for guest code.
//!
//! Guest code never touches the process stdout/stderr: every write goes
//! through an `OutputStreams` value handed to the evaluation call. A capture
//! window swaps the destinations for per-submission buffers and the guard
//! puts the previous destinations back exactly once.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::ConsoleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Text written during one capture window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
enum Sink {
    /// Outside a capture window writes are forwarded to the log.
    Log,
    Buffer(Rc<RefCell<String>>),
}

impl Sink {
    fn is_log(&self) -> bool {
        matches!(self, Sink::Log)
    }
}

/// The stdout/stderr destinations visible to guest code on the worker.
#[derive(Debug)]
pub struct OutputStreams {
    stdout: RefCell<Sink>,
    stderr: RefCell<Sink>,
    active: Cell<bool>,
}

impl Default for OutputStreams {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputStreams {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdout: RefCell::new(Sink::Log),
            stderr: RefCell::new(Sink::Log),
            active: Cell::new(false),
        }
    }

    pub fn write(&self, kind: StreamKind, text: &str) {
        let sink = match kind {
            StreamKind::Stdout => self.stdout.borrow(),
            StreamKind::Stderr => self.stderr.borrow(),
        };
        match &*sink {
            Sink::Buffer(buffer) => buffer.borrow_mut().push_str(text),
            Sink::Log => {
                let text = text.trim_end_matches('\n');
                if text.is_empty() {
                    return;
                }
                match kind {
                    StreamKind::Stdout => tracing::info!(target: "guest.stdout", "{text}"),
                    StreamKind::Stderr => tracing::warn!(target: "guest.stderr", "{text}"),
                }
            }
        }
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.active.get()
    }

    /// True when both destinations are the log forwarders.
    #[must_use]
    pub fn at_defaults(&self) -> bool {
        self.stdout.borrow().is_log() && self.stderr.borrow().is_log()
    }

    /// Open a capture window.
    ///
    /// Only one window may be open at a time; a second request is a defect
    /// and fails instead of silently sharing the buffers.
    pub fn begin_capture(&self) -> Result<CaptureGuard<'_>, ConsoleError> {
        if self.active.replace(true) {
            tracing::error!("capture window opened while another one is active");
            return Err(ConsoleError::CaptureAlreadyActive);
        }

        let stdout = Rc::new(RefCell::new(String::new()));
        let stderr = Rc::new(RefCell::new(String::new()));
        let previous_stdout = self.stdout.replace(Sink::Buffer(Rc::clone(&stdout)));
        let previous_stderr = self.stderr.replace(Sink::Buffer(Rc::clone(&stderr)));

        Ok(CaptureGuard {
            streams: self,
            previous: Some((previous_stdout, previous_stderr)),
            stdout,
            stderr,
        })
    }
}

/// Scoped capture window. Dropping it restores the previous destinations.
#[derive(Debug)]
pub struct CaptureGuard<'a> {
    streams: &'a OutputStreams,
    previous: Option<(Sink, Sink)>,
    stdout: Rc<RefCell<String>>,
    stderr: Rc<RefCell<String>>,
}

impl CaptureGuard<'_> {
    /// Put the previous destinations back. Returns `false` if that already
    /// happened.
    pub fn restore(&mut self) -> bool {
        let Some((stdout, stderr)) = self.previous.take() else {
            return false;
        };
        self.streams.stdout.replace(stdout);
        self.streams.stderr.replace(stderr);
        self.streams.active.set(false);
        true
    }

    /// Close the window and hand back what was written in it.
    pub fn finish(mut self) -> CapturedOutput {
        self.restore();
        CapturedOutput {
            stdout: std::mem::take(&mut *self.stdout.borrow_mut()),
            stderr: std::mem::take(&mut *self.stderr.borrow_mut()),
        }
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_both_streams_and_restores_on_finish() {
        let streams = OutputStreams::new();
        let guard = streams.begin_capture().expect("capture");
        streams.write(StreamKind::Stdout, "A");
        streams.write(StreamKind::Stderr, "warn\n");
        assert!(streams.is_capturing());

        let output = guard.finish();
        assert_eq!(output.stdout, "A");
        assert_eq!(output.stderr, "warn\n");
        assert!(!streams.is_capturing());
        assert!(streams.at_defaults());
    }

    #[test]
    fn second_window_fails_fast() {
        let streams = OutputStreams::new();
        let _guard = streams.begin_capture().expect("capture");
        assert!(matches!(
            streams.begin_capture(),
            Err(ConsoleError::CaptureAlreadyActive)
        ));
    }

    #[test]
    fn restore_happens_exactly_once() {
        let streams = OutputStreams::new();
        let mut guard = streams.begin_capture().expect("capture");
        assert!(guard.restore());
        assert!(!guard.restore());
        drop(guard);
        assert!(streams.at_defaults());

        // A new window after the restore starts from clean buffers.
        let guard = streams.begin_capture().expect("capture");
        streams.write(StreamKind::Stdout, "second");
        assert_eq!(guard.finish().stdout, "second");
    }

    #[test]
    fn dropping_guard_on_unwind_restores_destinations() {
        let streams = OutputStreams::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = streams.begin_capture().expect("capture");
            streams.write(StreamKind::Stdout, "partial");
            panic!("guest blew up");
        }));
        assert!(result.is_err());
        assert!(!streams.is_capturing());
        assert!(streams.at_defaults());
    }

    #[test]
    fn writes_after_window_do_not_reach_old_buffer() {
        let streams = OutputStreams::new();
        let guard = streams.begin_capture().expect("capture");
        let output = guard.finish();
        streams.write(StreamKind::Stdout, "late");
        assert!(output.stdout.is_empty());
    }
}
