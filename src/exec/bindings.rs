//! Binding environment and evaluation of guest code.
//!
//! Global bindings are the frozen builtin `Globals`; local bindings are one
//! long-lived `Module` so variables survive between submissions. Both live
//! on the worker thread: Starlark values are tied to the module heap.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use starlark::any::ProvidesStaticType;
use starlark::environment::{Globals, GlobalsBuilder, LibraryExtension, Module};
use starlark::eval::Evaluator;
use starlark::starlark_module;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::{Value, ValueLike};
use starlark::values::float::StarlarkFloat;
use starlark::values::none::NoneType;
use tokio_util::sync::CancellationToken;

use super::capture::{OutputStreams, StreamKind};
use super::record::{GuestError, GuestErrorKind, ResultSnapshot};

/// Name under which the last non-`None` result is bound.
pub const LAST_RESULT_NAME: &str = "_";

const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Seed value for a binding, taken from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// Per-evaluation context reachable from the console builtins.
#[derive(ProvidesStaticType)]
pub struct GuestContext {
    streams: Rc<OutputStreams>,
    cancel: CancellationToken,
    /// Set when a builtin stopped because of `cancel`.
    interrupted: Cell<bool>,
}

impl GuestContext {
    #[must_use]
    pub fn new(streams: Rc<OutputStreams>, cancel: CancellationToken) -> Self {
        Self {
            streams,
            cancel,
            interrupted: Cell::new(false),
        }
    }
}

impl starlark::PrintHandler for GuestContext {
    fn println(&self, text: &str) -> starlark::Result<()> {
        self.streams.write(StreamKind::Stdout, text);
        self.streams.write(StreamKind::Stdout, "\n");
        Ok(())
    }
}

fn outside_console() -> anyhow::Error {
    anyhow!("console builtins are only available inside the console")
}

fn seconds_from(value: Value) -> anyhow::Result<f64> {
    if let Some(whole) = value.unpack_i32() {
        return Ok(f64::from(whole));
    }
    if let Some(float) = value.downcast_ref::<StarlarkFloat>() {
        return Ok(float.0);
    }
    Err(anyhow!(
        "sleep() expects a number of seconds, got {}",
        value.get_type()
    ))
}

#[starlark_module]
fn console_builtins(builder: &mut GlobalsBuilder) {
    /// Write text to stdout without a trailing newline.
    fn write(text: Value, eval: &mut Evaluator) -> anyhow::Result<NoneType> {
        let guest = eval
            .extra
            .and_then(|extra| extra.downcast_ref::<GuestContext>())
            .ok_or_else(outside_console)?;
        guest.streams.write(StreamKind::Stdout, &text.to_str());
        Ok(NoneType)
    }

    /// Print to stderr.
    fn eprint(text: Value, eval: &mut Evaluator) -> anyhow::Result<NoneType> {
        let guest = eval
            .extra
            .and_then(|extra| extra.downcast_ref::<GuestContext>())
            .ok_or_else(outside_console)?;
        guest.streams.write(StreamKind::Stderr, &text.to_str());
        guest.streams.write(StreamKind::Stderr, "\n");
        Ok(NoneType)
    }

    /// Block for `seconds`. Cancelling the submission interrupts the wait.
    fn sleep(seconds: Value, eval: &mut Evaluator) -> anyhow::Result<NoneType> {
        let guest = eval
            .extra
            .and_then(|extra| extra.downcast_ref::<GuestContext>())
            .ok_or_else(outside_console)?;
        let seconds = seconds_from(seconds)?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(anyhow!("sleep() expects a non-negative duration"));
        }
        let deadline = Instant::now() + Duration::from_secs_f64(seconds);
        loop {
            if guest.cancel.is_cancelled() {
                guest.interrupted.set(true);
                return Err(anyhow!("cancelled"));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(NoneType);
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    /// Send a message to the log pane.
    fn log(message: Value) -> anyhow::Result<NoneType> {
        tracing::info!(target: "guest", "{}", message.to_str());
        Ok(NoneType)
    }

    /// Send a warning to the log pane.
    fn warn(message: Value) -> anyhow::Result<NoneType> {
        tracing::warn!(target: "guest", "{}", message.to_str());
        Ok(NoneType)
    }
}

fn build_globals() -> Globals {
    GlobalsBuilder::extended_by(&[
        LibraryExtension::Print,
        LibraryExtension::Json,
        LibraryExtension::StructType,
        LibraryExtension::Map,
        LibraryExtension::Filter,
        LibraryExtension::Typing,
    ])
    .with(console_builtins)
    .build()
}

/// Global and local bindings used for every submission.
pub struct Bindings {
    globals: Globals,
    module: Module,
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new(&BTreeMap::new())
    }
}

impl Bindings {
    #[must_use]
    pub fn new(seed: &BTreeMap<String, SeedValue>) -> Self {
        let bindings = Self {
            globals: build_globals(),
            module: Module::new(),
        };
        for (name, value) in seed {
            bindings.set(name, value);
        }
        bindings
    }

    fn set(&self, name: &str, value: &SeedValue) {
        let heap = self.module.heap();
        let value = match value {
            SeedValue::Str(s) => heap.alloc(s.as_str()),
            SeedValue::Int(n) => match i32::try_from(*n) {
                Ok(small) => heap.alloc(small),
                Err(_) => heap.alloc(*n),
            },
            SeedValue::Float(f) => heap.alloc(*f),
            SeedValue::Bool(b) => Value::new_bool(*b),
        };
        self.module.set(name, value);
    }

    /// Evaluate `source` with output routed through `guest`.
    ///
    /// Returns `Ok(None)` when the last statement produced no value.
    pub fn evaluate(
        &self,
        source: &str,
        guest: &GuestContext,
    ) -> Result<Option<ResultSnapshot>, GuestError> {
        let ast = AstModule::parse("<console>", source.to_owned(), &Dialect::Extended)
            .map_err(|err| GuestError::new(GuestErrorKind::Parse, err.to_string()))?;

        guest.interrupted.set(false);
        let mut eval = Evaluator::new(&self.module);
        eval.set_print_handler(guest);
        eval.extra = Some(guest);
        let value = match eval.eval_module(ast, &self.globals) {
            Ok(value) => value,
            Err(err) => {
                let kind = if guest.interrupted.get() {
                    GuestErrorKind::Cancelled
                } else {
                    GuestErrorKind::Evaluation
                };
                return Err(GuestError::new(kind, err.to_string()));
            }
        };
        drop(eval);

        if value.is_none() {
            return Ok(None);
        }
        let snapshot = snapshot_of(value);
        self.module.set(LAST_RESULT_NAME, value);
        Ok(Some(snapshot))
    }
}

fn snapshot_of(value: Value) -> ResultSnapshot {
    let json = value
        .to_json()
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok());
    ResultSnapshot {
        repr: value.to_repr(),
        type_name: value.get_type().to_string(),
        json,
    }
}
