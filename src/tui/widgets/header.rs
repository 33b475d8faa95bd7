//! Header bar widget displaying the title and worker activity.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::palette;

use super::Renderable;

/// Data required to render the header bar.
pub struct HeaderData<'a> {
    pub title: &'a str,
    pub running: usize,
    pub test_mode: bool,
}

/// Header bar widget (1 line height).
///
/// Layout: `title [test mode] | (spacer) | [N running]`
pub struct HeaderWidget<'a> {
    data: HeaderData<'a>,
}

impl<'a> HeaderWidget<'a> {
    #[must_use]
    pub fn new(data: HeaderData<'a>) -> Self {
        Self { data }
    }

    fn title_spans(&self) -> Vec<Span<'static>> {
        let mut spans = vec![Span::styled(
            format!(" {} ", self.data.title),
            Style::default()
                .fg(palette::CONSOLE_TEAL)
                .add_modifier(Modifier::BOLD),
        )];
        if self.data.test_mode {
            spans.push(Span::styled(
                "[test mode] ",
                Style::default().fg(palette::TEXT_MUTED),
            ));
        }
        spans
    }

    fn running_indicator(&self) -> Option<Span<'static>> {
        if self.data.running == 0 {
            return None;
        }
        Some(Span::styled(
            format!(" {} running ", self.data.running),
            Style::default()
                .fg(palette::STATUS_WARNING)
                .add_modifier(Modifier::BOLD),
        ))
    }
}

impl Renderable for HeaderWidget<'_> {
    fn render(&self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let mut spans = self.title_spans();
        let left_width: usize = spans.iter().map(|s| s.content.width()).sum();
        let running = self.running_indicator();
        let right_width = running.as_ref().map_or(0, |s| s.content.width());
        let available = area.width as usize;

        if let Some(running) = running
            && available >= left_width + right_width
        {
            spans.push(Span::raw(" ".repeat(available - left_width - right_width)));
            spans.push(running);
        }

        let paragraph =
            Paragraph::new(Line::from(spans)).style(Style::default().bg(palette::HEADER_BG));
        paragraph.render(area, buf);
    }

    fn desired_height(&self, _width: u16) -> u16 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_row(running: usize, width: u16) -> String {
        let widget = HeaderWidget::new(HeaderData {
            title: "console",
            running,
            test_mode: false,
        });
        let area = Rect::new(0, 0, width, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);
        (0..width).map(|x| buf[(x, 0)].symbol()).collect()
    }

    #[test]
    fn running_count_is_right_aligned() {
        let row = render_row(2, 40);
        assert!(row.starts_with(" console "));
        assert!(row.ends_with(" 2 running "));
    }

    #[test]
    fn running_count_is_dropped_when_too_narrow() {
        let row = render_row(2, 12);
        assert!(!row.contains("running"));
        assert!(row.starts_with(" console "));
    }
}
