//! Isolated execution of guest code.
//!
//! The UI task submits text through the `Dispatcher`; a single `WorkerLoop`
//! thread evaluates it with captured output; the `CompletionBridge` folds
//! the results back into the `History` on the next UI tick.

mod bindings;
mod bridge;
mod capture;
mod console;
mod dispatcher;
mod format;
mod record;
mod signal;
mod worker;

pub use bindings::SeedValue;
pub use console::Console;
pub use dispatcher::SubmitOutcome;
pub use record::{DEFAULT_MAX_RECORDS, ExecutionRecord, History, RecordStatus, RunState};
pub use signal::{ExitSignal, RedrawSignal};
pub use worker::WorkerConfig;

#[cfg(test)]
pub use bridge::apply_completion;
#[cfg(test)]
pub use record::{ExecutionHandle, Outcome, ResultSnapshot};
#[cfg(test)]
pub use worker::Completion;

#[cfg(test)]
mod tests;
