//! Persistent input history with Up/Down recall.
//!
//! Stored as one JSON string per line so multi-line inputs survive.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Default)]
pub struct InputHistory {
    entries: Vec<String>,
    max_entries: usize,
    path: Option<PathBuf>,
    index: Option<usize>,
    draft: String,
}

impl InputHistory {
    /// In-memory history that is never written to disk.
    #[must_use]
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::default()
        }
    }

    /// Load history from `path`. A missing file is an empty history.
    pub fn load(path: &Path, max_entries: usize) -> Result<Self> {
        let mut history = Self {
            max_entries,
            path: Some(path.to_path_buf()),
            ..Self::default()
        };
        if !path.exists() {
            return Ok(history);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input history from {}", path.display()))?;
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<String>(line) {
                Ok(entry) => history.entries.push(entry),
                Err(err) => tracing::debug!("skipping malformed history line: {err}"),
            }
        }
        history.trim();
        Ok(history)
    }

    fn trim(&mut self) -> bool {
        if self.max_entries == 0 {
            let had_entries = !self.entries.is_empty();
            self.entries.clear();
            return had_entries;
        }
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(0..excess);
            return true;
        }
        false
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Remember an accepted input and persist it.
    pub fn record(&mut self, entry: &str) -> Result<()> {
        self.reset_navigation();
        if entry.trim().is_empty() || self.entries.last().is_some_and(|last| last == entry) {
            return Ok(());
        }
        self.entries.push(entry.to_string());
        let trimmed = self.trim();

        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory {}", parent.display())
            })?;
        }
        if trimmed {
            self.rewrite(path)
        } else {
            append_entry(path, entry)
        }
    }

    fn rewrite(&self, path: &Path) -> Result<()> {
        let mut content = String::new();
        for entry in &self.entries {
            content.push_str(&serde_json::to_string(entry).context("Failed to encode entry")?);
            content.push('\n');
        }
        fs::write(path, content)
            .with_context(|| format!("Failed to write input history to {}", path.display()))
    }

    pub fn reset_navigation(&mut self) {
        self.index = None;
        self.draft.clear();
    }

    #[must_use]
    pub fn is_navigating(&self) -> bool {
        self.index.is_some()
    }

    /// Step back in time. `current` is kept as the draft when navigation
    /// starts.
    pub fn older(&mut self, current: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let next = match self.index {
            None => {
                self.draft = current.to_string();
                self.entries.len() - 1
            }
            Some(i) => i.saturating_sub(1),
        };
        self.index = Some(next);
        self.entries.get(next).map(String::as_str)
    }

    /// Step forward in time; past the newest entry the draft comes back.
    pub fn newer(&mut self) -> Option<String> {
        let i = self.index?;
        if i + 1 < self.entries.len() {
            self.index = Some(i + 1);
            return self.entries.get(i + 1).cloned();
        }
        self.index = None;
        Some(std::mem::take(&mut self.draft))
    }
}

fn append_entry(path: &Path, entry: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open input history {}", path.display()))?;
    let line = serde_json::to_string(entry).context("Failed to encode entry")?;
    writeln!(file, "{line}")
        .with_context(|| format!("Failed to append to input history {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn entries_survive_a_reload_including_newlines() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("history");

        let mut history = InputHistory::load(&path, 10).expect("load");
        history.record("x = 1").expect("record");
        history.record("def f():\n    return 2").expect("record");
        history.record("def f():\n    return 2").expect("duplicate");

        let reloaded = InputHistory::load(&path, 10).expect("reload");
        assert_eq!(reloaded.entries(), ["x = 1", "def f():\n    return 2"]);
    }

    #[test]
    fn bound_is_applied_on_record_and_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("history");
        let mut history = InputHistory::load(&path, 2).expect("load");
        for entry in ["a", "b", "c"] {
            history.record(entry).expect("record");
        }
        assert_eq!(history.entries(), ["b", "c"]);
        assert_eq!(InputHistory::load(&path, 2).expect("reload").entries(), ["b", "c"]);
        assert_eq!(InputHistory::load(&path, 1).expect("reload").entries(), ["c"]);
    }

    #[test]
    fn navigation_restores_the_draft() {
        let mut history = InputHistory::in_memory(10);
        history.record("first").expect("record");
        history.record("second").expect("record");

        assert_eq!(history.older("draft"), Some("second"));
        assert_eq!(history.older("second"), Some("first"));
        assert_eq!(history.older("first"), Some("first"));
        assert_eq!(history.newer().as_deref(), Some("second"));
        assert_eq!(history.newer().as_deref(), Some("draft"));
        assert!(!history.is_navigating());
        assert_eq!(history.newer(), None);
    }

    #[test]
    fn blank_entries_and_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("history");
        fs::write(&path, "\"ok\"\nnot json\n\n").expect("seed file");
        let mut history = InputHistory::load(&path, 10).expect("load");
        history.record("   ").expect("blank");
        assert_eq!(history.entries(), ["ok"]);
    }
}
