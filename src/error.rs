//! Error taxonomy for the execution core.
//!
//! Guest failures are display data (`GuestError`) and never travel through
//! this type. `ConsoleError` covers the console's own machinery.

use thiserror::Error;

/// Broad category for log lines and exit diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Worker,
    Invariant,
    Io,
}

/// Errors raised by the execution core and the UI glue around it.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("failed to start the worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("worker loop stopped: {0}")]
    WorkerLost(String),

    #[error("worker queue is closed; submission was not accepted")]
    WorkerUnavailable,

    #[error("an output capture window is already active")]
    CaptureAlreadyActive,

    #[error("terminal I/O failed: {0}")]
    Terminal(#[from] std::io::Error),
}

impl ConsoleError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::WorkerSpawn(_) | Self::WorkerLost(_) | Self::WorkerUnavailable => {
                ErrorCategory::Worker
            }
            Self::CaptureAlreadyActive => ErrorCategory::Invariant,
            Self::Terminal(_) => ErrorCategory::Io,
        }
    }

    /// Fatal errors end the console session: no later submission can be
    /// guaranteed to run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WorkerSpawn(_) | Self::WorkerLost(_) | Self::WorkerUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_errors_are_fatal() {
        assert!(ConsoleError::WorkerUnavailable.is_fatal());
        assert!(ConsoleError::WorkerLost("runtime".to_string()).is_fatal());
        assert!(!ConsoleError::CaptureAlreadyActive.is_fatal());
        assert_eq!(
            ConsoleError::CaptureAlreadyActive.category(),
            ErrorCategory::Invariant
        );
    }
}
