//! System clipboard access for copying results.

use anyhow::{Context, Result};
use arboard::Clipboard;

use crate::exec::ExecutionRecord;

/// Lazily opened clipboard handle.
#[derive(Default)]
pub struct ClipboardHandler {
    clipboard: Option<Clipboard>,
}

impl ClipboardHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_text(&mut self, text: &str) -> Result<()> {
        let clipboard = match self.clipboard.take() {
            Some(clipboard) => clipboard,
            None => Clipboard::new().context("Failed to access clipboard")?,
        };
        self.clipboard
            .insert(clipboard)
            .set_text(text.to_string())
            .context("Failed to write to clipboard")
    }
}

/// Text copied for a record's result.
///
/// String values are copied without their quotes; anything else as displayed.
#[must_use]
pub fn copy_text(record: &ExecutionRecord) -> Option<String> {
    if let Some(serde_json::Value::String(text)) =
        record.result_object().and_then(|value| value.json.as_ref())
    {
        return Some(text.clone());
    }
    record.result_text().map(str::to_string)
}
