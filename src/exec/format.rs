//! Display formatting for guest results and exceptions.
//!
//! Every formatter returns styled lines for the REPL pane and the same text
//! with styling removed for storage and the clipboard.

use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};

use crate::palette;

use super::record::{GuestError, GuestErrorKind, ResultSnapshot};

/// Longest rendering kept for a single result or exception.
pub const MAX_FORMATTED_LINES: usize = 200;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedOutput {
    pub styled: Vec<Line<'static>>,
    pub plain: String,
}

impl FormattedOutput {
    fn from_lines(styled: Vec<Line<'static>>) -> Self {
        let plain = remove_formatting(&styled);
        Self { styled, plain }
    }
}

/// Concatenate span contents, one line per row.
#[must_use]
pub fn remove_formatting(lines: &[Line<'_>]) -> String {
    lines
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| span.content.as_ref())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn value_style(type_name: &str) -> Style {
    match type_name {
        "string" => Style::default().fg(palette::VALUE_STRING),
        "int" | "float" => Style::default().fg(palette::VALUE_NUMBER),
        "bool" | "NoneType" => Style::default()
            .fg(palette::VALUE_KEYWORD)
            .add_modifier(Modifier::BOLD),
        _ => Style::default().fg(palette::TEXT_PRIMARY),
    }
}

fn is_container(json: &serde_json::Value) -> bool {
    matches!(
        json,
        serde_json::Value::Object(_) | serde_json::Value::Array(_)
    )
}

const INDENT: &str = "  ";

fn push_break(out: &mut String, depth: usize) {
    out.push('\n');
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

/// Lay a container repr out one element per line.
///
/// Works on the repr so scalars keep their own spelling (large ints stay
/// ints). String literals are copied through untouched.
fn pretty_repr(repr: &str) -> String {
    let mut out = String::with_capacity(repr.len() * 2);
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = repr.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '[' | '{' | '(' => {
                out.push(c);
                if !matches!(chars.peek(), Some(']' | '}' | ')')) {
                    depth += 1;
                    push_break(&mut out, depth);
                }
            }
            ']' | '}' | ')' => {
                if !out.ends_with(['[', '{', '(']) {
                    depth = depth.saturating_sub(1);
                    push_break(&mut out, depth);
                }
                out.push(c);
            }
            ',' => {
                out.push(c);
                if chars.peek() == Some(&' ') {
                    chars.next();
                }
                // Trailing comma of `(1,)`: the close bracket adds the break.
                if !matches!(chars.peek(), Some(')')) {
                    push_break(&mut out, depth);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Text for a value: long containers one element per line, the repr otherwise.
fn render_value(snapshot: &ResultSnapshot) -> String {
    match snapshot.json.as_ref() {
        Some(json) if is_container(json) && snapshot.repr.len() > 60 => {
            pretty_repr(&snapshot.repr)
        }
        _ => snapshot.repr.clone(),
    }
}

fn truncate_lines(text: &str, style: Style) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = text
        .lines()
        .take(MAX_FORMATTED_LINES)
        .map(|line| Line::from(Span::styled(line.to_string(), style)))
        .collect();
    let total = text.lines().count();
    if total > MAX_FORMATTED_LINES {
        lines.push(Line::from(Span::styled(
            format!("... {} more lines", total - MAX_FORMATTED_LINES),
            Style::default().fg(palette::TEXT_MUTED),
        )));
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(String::new(), style)));
    }
    lines
}

/// Format a returned value.
#[must_use]
pub fn format_result(snapshot: &ResultSnapshot) -> FormattedOutput {
    let text = render_value(snapshot);
    FormattedOutput::from_lines(truncate_lines(&text, value_style(&snapshot.type_name)))
}

/// Format a guest failure.
#[must_use]
pub fn format_exception(err: &GuestError) -> FormattedOutput {
    let heading = match err.kind {
        GuestErrorKind::Parse => "SyntaxError",
        GuestErrorKind::Evaluation => "Error",
        GuestErrorKind::Cancelled => "Cancelled",
        GuestErrorKind::Panic => "InternalError",
    };
    let heading_style = Style::default()
        .fg(palette::STATUS_ERROR)
        .add_modifier(Modifier::BOLD);
    let body_style = Style::default().fg(palette::STATUS_ERROR);

    let mut lines = vec![Line::from(Span::styled(
        format!("{heading}:"),
        heading_style,
    ))];
    let message = err.message.trim_end();
    if !message.is_empty() {
        lines.extend(truncate_lines(message, body_style));
    }
    FormattedOutput::from_lines(lines)
}
