mod header;

pub use header::{HeaderData, HeaderWidget};

use std::time::Duration;

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    prelude::Stylize,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use tracing::Level;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::exec::{ExecutionRecord, RecordStatus, RunState};
use crate::logging::LogLine;
use crate::palette;
use crate::tui::app::{App, Focus};

pub const PROMPT: &str = ">>> ";
pub const CONTINUATION: &str = "... ";

/// A widget that draws into a buffer and reports how tall it wants to be.
pub trait Renderable {
    fn render(&self, area: Rect, buf: &mut Buffer);
    fn desired_height(&self, width: u16) -> u16;
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let border = if focused {
        palette::FOCUS_BORDER
    } else {
        palette::BLUR_BORDER
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(Span::styled(title, Style::default().fg(palette::TEXT_DIM)))
}

/// Compact human duration: `850ms`, `1.25s`, `2m05s`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1_000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

fn expand_tabs(text: &str) -> String {
    text.replace('\t', "    ")
}

fn text_lines(text: &str, style: Style) -> impl Iterator<Item = Line<'static>> + '_ {
    text.trim_end_matches('\n')
        .split('\n')
        .map(move |line| Line::from(Span::styled(expand_tabs(line), style)))
}

fn status_line(text: String, color: ratatui::style::Color) -> Line<'static> {
    Line::from(Span::styled(format!("  {text}"), Style::default().fg(color)))
}

/// Display lines for one execution record.
#[must_use]
pub fn record_lines(record: &ExecutionRecord) -> Vec<Line<'static>> {
    let prompt_style = Style::default().fg(palette::PROMPT).add_modifier(Modifier::BOLD);
    let mut lines = Vec::new();

    for (idx, line) in record.input_text().split('\n').enumerate() {
        let prefix = if idx == 0 { PROMPT } else { CONTINUATION };
        lines.push(Line::from(vec![
            Span::styled(prefix, prompt_style),
            Span::styled(expand_tabs(line), Style::default().fg(palette::TEXT_PRIMARY)),
        ]));
    }

    if !record.stdout_capture().is_empty() {
        lines.extend(text_lines(
            record.stdout_capture(),
            Style::default().fg(palette::TEXT_PRIMARY),
        ));
    }
    if !record.stderr_capture().is_empty() {
        lines.extend(text_lines(
            record.stderr_capture(),
            Style::default().fg(palette::STATUS_WARNING),
        ));
    }

    let elapsed = format_elapsed(record.elapsed());
    match record.status() {
        RecordStatus::Pending => {
            let handle = record.handle();
            let text = if handle.is_cancelled() {
                format!("cancelling... {elapsed}")
            } else if handle.state() == RunState::Queued {
                "queued".to_string()
            } else {
                format!("running... {elapsed}")
            };
            lines.push(status_line(text, palette::TEXT_MUTED));
        }
        RecordStatus::Completed => {
            lines.extend(record.result_styled().iter().cloned());
            lines.push(status_line(elapsed, palette::TEXT_MUTED));
        }
        RecordStatus::Failed => {
            lines.extend(record.exception_styled().iter().cloned());
            lines.push(status_line(format!("failed after {elapsed}"), palette::TEXT_MUTED));
        }
        RecordStatus::Cancelled => {
            lines.push(status_line("cancelled".to_string(), palette::TEXT_MUTED));
        }
    }
    lines
}

/// Split a styled line into rows no wider than `width` cells.
#[must_use]
pub fn wrap_line(line: &Line<'static>, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0usize;

    for span in &line.spans {
        let mut chunk = String::new();
        for grapheme in span.content.graphemes(true) {
            let grapheme_width = grapheme.width();
            if current_width + grapheme_width > width && current_width != 0 {
                if !chunk.is_empty() {
                    current.push(Span::styled(std::mem::take(&mut chunk), span.style));
                }
                rows.push(Line::from(std::mem::take(&mut current)).style(line.style));
                current_width = 0;
            }
            chunk.push_str(grapheme);
            current_width += grapheme_width;
        }
        if !chunk.is_empty() {
            current.push(Span::styled(chunk, span.style));
        }
    }
    rows.push(Line::from(current).style(line.style));
    rows
}

/// REPL transcript pane.
pub struct ReplWidget {
    lines: Vec<Line<'static>>,
    focused: bool,
    scrolled: bool,
}

impl ReplWidget {
    /// Build the visible rows for `area`, clamping the app's scroll offset.
    pub fn new(app: &mut App, area: Rect) -> Self {
        let inner_width = usize::from(area.width.saturating_sub(2)).max(1);
        let visible = usize::from(area.height.saturating_sub(2));

        let mut rows = Vec::new();
        if let Some(message) = app.options.startup_message.as_deref() {
            for line in text_lines(message, Style::default().fg(palette::TEXT_DIM)) {
                rows.extend(wrap_line(&line, inner_width));
            }
            rows.push(Line::from(""));
        }
        for record in app.history.iter() {
            for line in record_lines(record) {
                rows.extend(wrap_line(&line, inner_width));
            }
        }

        let max_scroll = rows.len().saturating_sub(visible);
        app.repl_scroll = app.repl_scroll.min(max_scroll);
        let end = rows.len() - app.repl_scroll;
        let start = end.saturating_sub(visible);
        rows.truncate(end);
        let lines = rows.split_off(start);

        Self {
            lines,
            focused: app.focus == Focus::Repl,
            scrolled: app.repl_scroll > 0,
        }
    }
}

impl Renderable for ReplWidget {
    fn render(&self, area: Rect, buf: &mut Buffer) {
        let title = if self.scrolled {
            " REPL (scrolled) ".to_string()
        } else {
            " REPL ".to_string()
        };
        Paragraph::new(self.lines.clone())
            .block(pane_block(title, self.focused))
            .render(area, buf);
    }

    fn desired_height(&self, _width: u16) -> u16 {
        1
    }
}

fn level_style(level: Level) -> Style {
    match level {
        Level::ERROR => Style::default().fg(palette::STATUS_ERROR).bold(),
        Level::WARN => Style::default().fg(palette::STATUS_WARNING),
        Level::INFO => Style::default().fg(palette::STATUS_SUCCESS),
        Level::DEBUG => Style::default().fg(palette::STATUS_INFO),
        _ => Style::default().fg(palette::TEXT_MUTED),
    }
}

/// One log pane row: `time level source message`, cut to `width`.
#[must_use]
pub fn log_line(line: &LogLine, width: usize) -> Line<'static> {
    let source = line.module.as_deref().unwrap_or(&line.target);
    let time = line.timestamp.format("%H:%M:%S").to_string();
    let level = format!("{:<5}", line.level.as_str());
    let fixed = format!("{time} {level} {source} ");
    let message = truncate_line_to_width(
        &expand_tabs(&line.message.replace('\n', " ")),
        width.saturating_sub(fixed.width()),
    );
    Line::from(vec![
        Span::styled(format!("{time} "), Style::default().fg(palette::TEXT_MUTED)),
        Span::styled(format!("{level} "), level_style(line.level)),
        Span::styled(format!("{source} "), Style::default().fg(palette::TEXT_DIM)),
        Span::styled(message, Style::default().fg(palette::TEXT_PRIMARY)),
    ])
}

/// Streaming log pane.
pub struct LogWidget {
    lines: Vec<Line<'static>>,
    focused: bool,
    following: bool,
}

impl LogWidget {
    pub fn new(app: &mut App, area: Rect) -> Self {
        let inner_width = usize::from(area.width.saturating_sub(2));
        let visible = usize::from(area.height.saturating_sub(2));
        let total = app.log_store.len();
        // A paused view stays on the same lines while new ones arrive.
        let appended = app.log_store.appended();
        if app.log_scroll > 0 {
            let arrived =
                usize::try_from(appended.wrapping_sub(app.log_seen)).unwrap_or(usize::MAX);
            app.log_scroll = app.log_scroll.saturating_add(arrived);
        }
        app.log_seen = appended;
        app.log_scroll = app.log_scroll.min(total.saturating_sub(visible));

        let lines = app
            .log_store
            .window(visible, app.log_scroll)
            .iter()
            .map(|line| log_line(line, inner_width))
            .collect();
        Self {
            lines,
            focused: app.focus == Focus::Log,
            following: app.log_scroll == 0,
        }
    }
}

impl Renderable for LogWidget {
    fn render(&self, area: Rect, buf: &mut Buffer) {
        let title = if self.following {
            " Logs ".to_string()
        } else {
            " Logs (paused) ".to_string()
        };
        Paragraph::new(self.lines.clone())
            .block(pane_block(title, self.focused))
            .render(area, buf);
    }

    fn desired_height(&self, _width: u16) -> u16 {
        1
    }
}

pub struct ComposerWidget<'a> {
    app: &'a App,
    max_height: u16,
}

impl<'a> ComposerWidget<'a> {
    pub fn new(app: &'a App, max_height: u16) -> Self {
        Self { app, max_height }
    }

    pub fn cursor_pos(&self, area: Rect) -> Option<(u16, u16)> {
        let prompt_width = u16::try_from(PROMPT.width()).unwrap_or(u16::MAX);
        let content_width = usize::from(area.width.saturating_sub(prompt_width).max(1));
        let (_visible, cursor_row, cursor_col) = layout_input(
            &self.app.input,
            self.app.cursor_position,
            content_width,
            usize::from(area.height).max(1),
        );

        let cursor_x = area
            .x
            .saturating_add(prompt_width)
            .saturating_add(u16::try_from(cursor_col).unwrap_or(u16::MAX));
        let cursor_y = area
            .y
            .saturating_add(u16::try_from(cursor_row).unwrap_or(u16::MAX));
        if cursor_x < area.x + area.width && cursor_y < area.y + area.height {
            Some((cursor_x, cursor_y))
        } else {
            None
        }
    }
}

impl Renderable for ComposerWidget<'_> {
    fn render(&self, area: Rect, buf: &mut Buffer) {
        let prompt_width = u16::try_from(PROMPT.width()).unwrap_or(u16::MAX);
        let content_width = usize::from(area.width.saturating_sub(prompt_width).max(1));
        let (visible_lines, _row, _col) = layout_input(
            &self.app.input,
            self.app.cursor_position,
            content_width,
            usize::from(area.height).max(1),
        );

        let background = Style::default().bg(palette::COMPOSER_BG);
        let prompt_style = Style::default().fg(palette::PROMPT).bold();
        let mut lines = Vec::new();
        if self.app.input.is_empty() {
            lines.push(Line::from(vec![
                Span::styled(PROMPT, prompt_style),
                Span::styled(
                    "Starlark code; Enter runs, Alt+Enter adds a line",
                    Style::default().fg(palette::TEXT_MUTED).italic(),
                ),
            ]));
        } else {
            for (idx, line) in visible_lines.into_iter().enumerate() {
                let prefix = if idx == 0 { PROMPT } else { CONTINUATION };
                lines.push(Line::from(vec![
                    Span::styled(prefix, prompt_style),
                    Span::styled(line, Style::default().fg(palette::TEXT_PRIMARY)),
                ]));
            }
        }

        Paragraph::new(lines).style(background).render(area, buf);
    }

    fn desired_height(&self, width: u16) -> u16 {
        let prompt_width = u16::try_from(PROMPT.width()).unwrap_or(u16::MAX);
        let content_width = usize::from(width.saturating_sub(prompt_width).max(1));
        let line_count = wrap_input_lines(&self.app.input, content_width).len().max(1);
        let max_height = usize::from(self.max_height.clamp(1, 8));
        line_count.clamp(1, max_height).try_into().unwrap_or(1)
    }
}

fn layout_input(
    input: &str,
    cursor: usize,
    width: usize,
    max_height: usize,
) -> (Vec<String>, usize, usize) {
    let mut lines = wrap_input_lines(input, width);
    if lines.is_empty() {
        lines.push(String::new());
    }
    let (cursor_row, cursor_col) = cursor_row_col(input, cursor, width.max(1));

    let max_height = max_height.max(1);
    let mut start = 0usize;
    if cursor_row >= max_height {
        start = cursor_row + 1 - max_height;
    }
    if start + max_height > lines.len() {
        start = lines.len().saturating_sub(max_height);
    }
    let visible = lines
        .into_iter()
        .skip(start)
        .take(max_height)
        .collect::<Vec<_>>();

    (
        visible,
        cursor_row.saturating_sub(start),
        cursor_col.min(width.saturating_sub(1)),
    )
}

fn cursor_row_col(input: &str, cursor: usize, width: usize) -> (usize, usize) {
    let mut row = 0usize;
    let mut col = 0usize;
    let mut char_idx = 0usize;

    for grapheme in input.graphemes(true) {
        if char_idx >= cursor {
            break;
        }
        char_idx += grapheme.chars().count();

        if grapheme == "\n" {
            row += 1;
            col = 0;
            continue;
        }

        let grapheme_width = grapheme.width();
        if col + grapheme_width > width && col != 0 {
            row += 1;
            col = 0;
        }
        col += grapheme_width;
        if col >= width {
            row += 1;
            col = 0;
        }
    }

    (row, col)
}

fn wrap_input_lines(input: &str, width: usize) -> Vec<String> {
    if input.is_empty() {
        return Vec::new();
    }
    input
        .split('\n')
        .flat_map(|raw| wrap_text(raw, width))
        .collect()
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;
    for grapheme in text.graphemes(true) {
        let grapheme_width = grapheme.width();
        if current_width + grapheme_width > width && current_width != 0 {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push_str(grapheme);
        current_width += grapheme_width;
        if current_width >= width {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
    }
    lines.push(current);
    lines
}

/// Cut `text` to `max_width` cells, ending in `...` when shortened.
#[must_use]
pub fn truncate_line_to_width(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width <= 3 {
        return text.chars().take(max_width).collect();
    }

    let mut out = String::new();
    let mut width = 0usize;
    let limit = max_width - 3;
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width > limit {
            break;
        }
        out.push(ch);
        width += ch_width;
    }
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecutionHandle;
    use chrono::Local;
    use pretty_assertions::assert_eq;

    fn plain(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn wrap_line_keeps_styles_across_rows() {
        let line = Line::from(vec![
            Span::styled(">>> ", Style::default().fg(palette::PROMPT)),
            Span::styled("abcdef", Style::default().fg(palette::TEXT_PRIMARY)),
        ]);
        let rows = wrap_line(&line, 6);
        let text: Vec<_> = rows.iter().map(plain).collect();
        assert_eq!(text, vec![">>> ab", "cdef"]);
        assert_eq!(rows[1].spans[0].style.fg, Some(palette::TEXT_PRIMARY));
    }

    #[test]
    fn wrap_line_of_empty_line_is_one_row() {
        assert_eq!(wrap_line(&Line::from(""), 10).len(), 1);
    }

    #[test]
    fn pending_record_shows_queued_then_running() {
        let handle = ExecutionHandle::new(1);
        let record = ExecutionRecord::pending("sleep(1)\n2", handle.clone());
        let text: Vec<_> = record_lines(&record).iter().map(plain).collect();
        assert_eq!(text, vec![">>> sleep(1)", "... 2", "  queued"]);

        handle.set_state(RunState::Running);
        let last = record_lines(&record).last().map(plain).unwrap_or_default();
        assert!(last.starts_with("  running... "));
    }

    #[test]
    fn elapsed_is_compact() {
        assert_eq!(format_elapsed(Duration::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Duration::from_millis(1_250)), "1.25s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn log_rows_prefer_module_and_truncate() {
        let line = LogLine {
            timestamp: Local::now(),
            level: Level::INFO,
            target: "fake_device.1".to_string(),
            module: Some("RADIO".to_string()),
            message: "x".repeat(100),
        };
        let row = log_line(&line, 40);
        let text = plain(&row);
        assert!(text.contains(" INFO  RADIO "));
        assert!(text.ends_with("..."));
        assert_eq!(text.width(), 40);
    }

    #[test]
    fn paused_log_view_stays_on_the_same_lines() {
        use crate::exec::{History, RedrawSignal};
        use crate::logging::LogStore;
        use crate::tui::app::TuiOptions;
        use crate::tui::input_history::InputHistory;

        let store = LogStore::new(100, RedrawSignal::new());
        let push = |n: usize| {
            store.push(LogLine {
                timestamp: Local::now(),
                level: Level::INFO,
                target: "test".to_string(),
                module: None,
                message: format!("line {n}"),
            });
        };
        (0..20).for_each(push);
        let mut app = App::new(
            TuiOptions {
                title: "t".to_string(),
                use_alt_screen: false,
                test_mode: false,
                startup_message: None,
                log_pane_percent: 50,
            },
            History::new(4),
            InputHistory::in_memory(4),
            store.clone(),
        );
        let area = Rect::new(0, 0, 40, 7);
        app.focus = Focus::Log;
        LogWidget::new(&mut app, area);
        app.scroll_up(3);

        let before: Vec<_> = LogWidget::new(&mut app, area).lines.iter().map(plain).collect();
        (20..25).for_each(push);
        let after: Vec<_> = LogWidget::new(&mut app, area).lines.iter().map(plain).collect();
        assert_eq!(before, after);
        assert_eq!(app.log_scroll, 8);
        assert!(!LogWidget::new(&mut app, area).following);
    }

    #[test]
    fn truncation_respects_wide_characters() {
        assert_eq!(truncate_line_to_width("hello", 10), "hello");
        assert_eq!(truncate_line_to_width("hello world", 8), "hello...");
        assert_eq!(truncate_line_to_width("中文测试中文", 7), "中文...");
    }

    #[test]
    fn cursor_tracks_newlines_and_wrapping() {
        assert_eq!(cursor_row_col("ab\ncd", 0, 10), (0, 0));
        assert_eq!(cursor_row_col("ab\ncd", 3, 10), (1, 0));
        assert_eq!(cursor_row_col("ab\ncd", 5, 10), (1, 2));
        assert_eq!(cursor_row_col("abcd", 4, 2), (2, 0));
        assert_eq!(wrap_input_lines("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(wrap_input_lines("a\n", 10), vec!["a", ""]);
    }
}
