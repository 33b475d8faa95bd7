//! Application state for the console TUI.

use crate::exec::History;
use crate::logging::LogStore;
use crate::tui::clipboard::{ClipboardHandler, copy_text};
use crate::tui::input_history::InputHistory;

/// Options derived from the command line and config for one TUI session.
#[derive(Debug, Clone)]
pub struct TuiOptions {
    pub title: String,
    pub use_alt_screen: bool,
    pub test_mode: bool,
    pub startup_message: Option<String>,
    pub log_pane_percent: u16,
}

/// Which pane receives scroll keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Repl,
    Log,
}

impl Focus {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Focus::Repl => Focus::Log,
            Focus::Log => Focus::Repl,
        }
    }
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn byte_index_at_char(text: &str, char_index: usize) -> usize {
    if char_index == 0 {
        return 0;
    }
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(idx, _)| idx)
}

fn remove_char_at(text: &mut String, char_index: usize) -> bool {
    let start = byte_index_at_char(text, char_index);
    let Some(ch) = text[start..].chars().next() else {
        return false;
    };
    text.replace_range(start..start + ch.len_utf8(), "");
    true
}

fn normalize_paste_text(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    }
}

pub struct App {
    pub options: TuiOptions,
    pub input: String,
    pub cursor_position: usize,
    pub history: History,
    pub focus: Focus,
    /// Lines scrolled up from the bottom of the REPL pane.
    pub repl_scroll: usize,
    /// Lines scrolled up from the tail of the log pane.
    pub log_scroll: usize,
    /// Log lines accounted for by `log_scroll`.
    pub log_seen: u64,
    pub status_message: Option<String>,
    pub input_history: InputHistory,
    pub log_store: LogStore,
    pub clipboard: ClipboardHandler,
    /// History version last drawn.
    pub drawn_version: Option<u64>,
    pub needs_redraw: bool,
}

impl App {
    #[must_use]
    pub fn new(
        options: TuiOptions,
        history: History,
        input_history: InputHistory,
        log_store: LogStore,
    ) -> Self {
        Self {
            options,
            input: String::new(),
            cursor_position: 0,
            history,
            focus: Focus::Repl,
            repl_scroll: 0,
            log_scroll: 0,
            log_seen: 0,
            status_message: None,
            input_history,
            log_store,
            clipboard: ClipboardHandler::new(),
            drawn_version: None,
            needs_redraw: true,
        }
    }

    pub fn insert_char(&mut self, c: char) {
        let cursor = self.cursor_position.min(char_count(&self.input));
        let byte_index = byte_index_at_char(&self.input, cursor);
        self.input.insert(byte_index, c);
        self.cursor_position = cursor + 1;
        self.needs_redraw = true;
    }

    pub fn insert_str(&mut self, text: &str) {
        let text = normalize_paste_text(text);
        let cursor = self.cursor_position.min(char_count(&self.input));
        let byte_index = byte_index_at_char(&self.input, cursor);
        self.input.insert_str(byte_index, &text);
        self.cursor_position = cursor + char_count(&text);
        self.needs_redraw = true;
    }

    pub fn delete_char(&mut self) {
        if self.cursor_position == 0 {
            return;
        }
        let target = self.cursor_position - 1;
        if remove_char_at(&mut self.input, target) {
            self.cursor_position = target;
            self.needs_redraw = true;
        }
    }

    pub fn delete_char_forward(&mut self) {
        if remove_char_at(&mut self.input, self.cursor_position) {
            self.needs_redraw = true;
        }
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
        self.needs_redraw = true;
    }

    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < char_count(&self.input) {
            self.cursor_position += 1;
            self.needs_redraw = true;
        }
    }

    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
        self.needs_redraw = true;
    }

    pub fn move_cursor_end(&mut self) {
        self.cursor_position = char_count(&self.input);
        self.needs_redraw = true;
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
        self.input_history.reset_navigation();
        self.needs_redraw = true;
    }

    fn set_input(&mut self, text: String) {
        self.input = text;
        self.cursor_position = char_count(&self.input);
        self.needs_redraw = true;
    }

    /// Take the composer text for submission, leaving the composer empty.
    pub fn take_input(&mut self) -> String {
        let input = std::mem::take(&mut self.input);
        self.clear_input();
        input
    }

    /// Remember an accepted submission in the persistent input history.
    pub fn remember_input(&mut self, text: &str) {
        if let Err(err) = self.input_history.record(text) {
            tracing::warn!("{err:#}");
            self.status_message = Some("Input history could not be saved".to_string());
        }
    }

    pub fn history_up(&mut self) {
        if let Some(entry) = self.input_history.older(&self.input) {
            let entry = entry.to_string();
            self.set_input(entry);
        }
    }

    pub fn history_down(&mut self) {
        if !self.input_history.is_navigating() {
            return;
        }
        if let Some(entry) = self.input_history.newer() {
            self.set_input(entry);
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = self.focus.toggled();
        self.needs_redraw = true;
    }

    pub fn scroll_up(&mut self, amount: usize) {
        match self.focus {
            Focus::Repl => self.repl_scroll = self.repl_scroll.saturating_add(amount),
            Focus::Log => {
                let max = self.log_store.len().saturating_sub(1);
                self.log_scroll = self.log_scroll.saturating_add(amount).min(max);
            }
        }
        self.needs_redraw = true;
    }

    pub fn scroll_down(&mut self, amount: usize) {
        match self.focus {
            Focus::Repl => self.repl_scroll = self.repl_scroll.saturating_sub(amount),
            Focus::Log => self.log_scroll = self.log_scroll.saturating_sub(amount),
        }
        self.needs_redraw = true;
    }

    /// Follow new output in the REPL pane.
    pub fn scroll_repl_to_bottom(&mut self) {
        self.repl_scroll = 0;
        self.needs_redraw = true;
    }

    /// Cancel the newest submission that has not finished.
    pub fn cancel_latest(&mut self) {
        let handles = self.history.unfinished_handles();
        self.status_message = Some(match handles.last() {
            Some(handle) if handle.is_cancelled() => {
                format!("#{} is already cancelling", handle.id())
            }
            Some(handle) => {
                handle.cancel();
                tracing::debug!(id = handle.id(), "cancel requested");
                format!("Cancelling #{}", handle.id())
            }
            None => "Nothing to cancel (Ctrl+D exits)".to_string(),
        });
        self.needs_redraw = true;
    }

    pub fn clear_finished(&mut self) {
        let removed = self.history.clear_finished();
        self.repl_scroll = 0;
        self.status_message = Some(format!("Cleared {removed} finished entries"));
        self.needs_redraw = true;
    }

    /// Copy the most recent result to the system clipboard.
    pub fn copy_last_result(&mut self) {
        let Some(text) = self.history.last_result().and_then(copy_text) else {
            self.status_message = Some("No result to copy".to_string());
            self.needs_redraw = true;
            return;
        };
        self.status_message = Some(match self.clipboard.write_text(&text) {
            Ok(()) => "Copied last result".to_string(),
            Err(err) => {
                tracing::warn!("{err:#}");
                format!("Copy failed: {err}")
            }
        });
        self.needs_redraw = true;
    }

    /// True when something changed since the last frame.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.needs_redraw
            || self.drawn_version != Some(self.history.version())
            || self.history.pending_count() > 0
    }

    pub fn mark_drawn(&mut self) {
        self.drawn_version = Some(self.history.version());
        self.needs_redraw = false;
    }
}
