//! Log routing for the console.
//!
//! Every `tracing` event lands in a bounded in-memory `LogStore` that the log
//! pane renders. Optionally the same events are appended to a log file.
//! Nothing is written to the terminal while the TUI owns it.

use std::collections::VecDeque;
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

use crate::exec::RedrawSignal;

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// One rendered log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub target: String,
    pub module: Option<String>,
    pub message: String,
}

#[derive(Debug)]
struct LogBuffer {
    lines: VecDeque<LogLine>,
    max_lines: usize,
    appended: u64,
}

/// Bounded, shared log buffer feeding the log pane.
#[derive(Debug, Clone)]
pub struct LogStore {
    inner: Arc<Mutex<LogBuffer>>,
    redraw: RedrawSignal,
}

impl LogStore {
    #[must_use]
    pub fn new(max_lines: usize, redraw: RedrawSignal) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogBuffer {
                lines: VecDeque::new(),
                max_lines: max_lines.max(1),
                appended: 0,
            })),
            redraw,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogBuffer> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, line: LogLine) {
        {
            let mut buffer = self.lock();
            buffer.lines.push_back(line);
            while buffer.lines.len() > buffer.max_lines {
                buffer.lines.pop_front();
            }
            buffer.appended = buffer.appended.wrapping_add(1);
        }
        self.redraw.request();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    /// Number of lines ever pushed, including evicted ones.
    #[must_use]
    pub fn appended(&self) -> u64 {
        self.lock().appended
    }

    /// Copy of up to `count` lines ending `skip_from_end` lines before the tail.
    #[must_use]
    pub fn window(&self, count: usize, skip_from_end: usize) -> Vec<LogLine> {
        let buffer = self.lock();
        let end = buffer.lines.len().saturating_sub(skip_from_end);
        let start = end.saturating_sub(count);
        buffer.lines.range(start..end).cloned().collect()
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    module: Option<String>,
    extra: Vec<String>,
}

impl FieldVisitor {
    fn into_parts(self) -> (String, Option<String>) {
        if self.extra.is_empty() {
            return (self.message, self.module);
        }
        let extra = self.extra.join(" ");
        let message = if self.message.is_empty() {
            extra
        } else {
            format!("{} {extra}", self.message)
        };
        (message, self.module)
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "module" => self.module = Some(value.to_string()),
            name => self.extra.push(format!("{name}={value}")),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "module" => self.module = Some(format!("{value:?}")),
            name => self.extra.push(format!("{name}={value:?}")),
        }
    }
}

/// `tracing` layer that copies events into a `LogStore`.
pub struct LogPaneLayer {
    store: LogStore,
}

impl LogPaneLayer {
    #[must_use]
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for LogPaneLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let (message, module) = visitor.into_parts();
        let meta = event.metadata();
        self.store.push(LogLine {
            timestamp: Local::now(),
            level: *meta.level(),
            target: meta.target().to_string(),
            module,
            message,
        });
    }
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    let level = level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        anyhow::bail!(
            "Invalid log level '{level}' (expected one of {})",
            LOG_LEVELS.join(", ")
        );
    }
    EnvFilter::try_new(&level).with_context(|| format!("Invalid log level '{level}'"))
}

/// Install the global subscriber.
pub fn init(level: &str, log_file: Option<&Path>, store: LogStore) -> Result<()> {
    let filter = env_filter(level)?;

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(LogPaneLayer::new(store))
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}
