//! TUI event loop and rendering logic for the console.

use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Paragraph},
};
use tokio_util::sync::CancellationToken;
use unicode_width::UnicodeWidthStr;

use crate::demo;
use crate::error::ConsoleError;
use crate::exec::{Console, SubmitOutcome};
use crate::palette;

use super::app::{App, Focus};
use super::widgets::{
    ComposerWidget, HeaderData, HeaderWidget, LogWidget, Renderable, ReplWidget,
    truncate_line_to_width,
};

// === Constants ===

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
const FAKE_LOG_INTERVAL: Duration = Duration::from_secs(1);
const PAGE_SCROLL: usize = 10;
const KEY_HINTS: &str = "Enter run  Alt+Enter newline  Tab focus  Ctrl+C cancel  Ctrl+D exit";

/// Run the interactive TUI until the user exits or the worker is lost.
///
/// The terminal is restored before returning, including on error.
pub async fn run_tui(mut app: App, mut console: Console) -> Result<()> {
    let use_alt_screen = app.options.use_alt_screen;
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if use_alt_screen {
        execute!(stdout, EnterAlternateScreen)?;
    }
    execute!(stdout, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let demo_cancel = CancellationToken::new();
    let demo_task = app
        .options
        .test_mode
        .then(|| demo::spawn_fake_device_logger(FAKE_LOG_INTERVAL, demo_cancel.clone()));

    let result = run_event_loop(&mut terminal, &mut app, &mut console).await;

    demo_cancel.cancel();
    if let Some(task) = demo_task {
        let _ = task.await;
    }
    console.shutdown(&mut app.history, SHUTDOWN_GRACE).await;

    disable_raw_mode()?;
    if use_alt_screen {
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    }
    execute!(terminal.backend_mut(), DisableBracketedPaste)?;
    terminal.show_cursor()?;

    result
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    console: &mut Console,
) -> Result<()> {
    loop {
        console.drain(&mut app.history)?;
        if console.exit_requested() {
            return Ok(());
        }

        if console.take_redraw() || app.is_dirty() {
            terminal.draw(|f| render(f, app))?;
            app.mark_drawn();
        }

        if event::poll(POLL_INTERVAL)? {
            let evt = event::read()?;
            if let Event::Resize(..) = evt {
                terminal.clear()?;
            }
            handle_event(app, console, evt)?;
        }
        // Let the demo logger and other tasks on this runtime make progress.
        tokio::task::yield_now().await;
    }
}

fn handle_event(app: &mut App, console: &mut Console, evt: Event) -> Result<(), ConsoleError> {
    match evt {
        Event::Paste(text) => {
            app.insert_str(&text);
            Ok(())
        }
        Event::Resize(..) => {
            app.needs_redraw = true;
            Ok(())
        }
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, console, key),
        _ => Ok(()),
    }
}

fn handle_key(app: &mut App, console: &mut Console, key: KeyEvent) -> Result<(), ConsoleError> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('d') if ctrl => {
            tracing::debug!("exit requested from keyboard");
            console.request_exit();
        }
        KeyCode::Char('c') if ctrl => {
            if app.input.is_empty() {
                app.cancel_latest();
            } else {
                app.clear_input();
            }
        }
        KeyCode::Char('y') if ctrl => app.copy_last_result(),
        KeyCode::Char('l') if ctrl => app.clear_finished(),
        KeyCode::Char('a') if ctrl => app.move_cursor_start(),
        KeyCode::Char('e') if ctrl => app.move_cursor_end(),
        KeyCode::Enter
            if key
                .modifiers
                .intersects(KeyModifiers::ALT | KeyModifiers::SHIFT) =>
        {
            app.insert_char('\n');
        }
        KeyCode::Enter => submit_input(app, console)?,
        KeyCode::Tab | KeyCode::BackTab => app.toggle_focus(),
        KeyCode::PageUp => app.scroll_up(PAGE_SCROLL),
        KeyCode::PageDown => app.scroll_down(PAGE_SCROLL),
        KeyCode::Up if app.focus == Focus::Log => app.scroll_up(1),
        KeyCode::Down if app.focus == Focus::Log => app.scroll_down(1),
        KeyCode::Up => app.history_up(),
        KeyCode::Down => app.history_down(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Esc => {
            app.status_message = None;
            app.needs_redraw = true;
        }
        KeyCode::Char(c) if !ctrl => app.insert_char(c),
        _ => {}
    }
    Ok(())
}

fn submit_input(app: &mut App, console: &mut Console) -> Result<(), ConsoleError> {
    let text = app.take_input();
    match console.submit(&text, &mut app.history)? {
        SubmitOutcome::Ignored => {}
        SubmitOutcome::Exit => {
            app.status_message = Some("Exiting...".to_string());
        }
        SubmitOutcome::Submitted(handle) => {
            tracing::debug!(id = handle.id(), "submitted");
            app.remember_input(&text);
            app.scroll_repl_to_bottom();
            app.status_message = None;
        }
    }
    Ok(())
}

fn render(f: &mut Frame, app: &mut App) {
    let size = f.area();

    let background = Block::default().style(Style::default().bg(palette::HEADER_BG));
    f.render_widget(background, size);

    let header_height = 1;
    let footer_height = 1;
    let available_height = size.height.saturating_sub(header_height + footer_height + 3);
    let composer_height = ComposerWidget::new(app, available_height).desired_height(size.width);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(header_height),   // Header
            Constraint::Min(3),                  // REPL and logs
            Constraint::Length(composer_height), // Composer
            Constraint::Length(footer_height),   // Footer
        ])
        .split(size);

    {
        let header = HeaderWidget::new(HeaderData {
            title: &app.options.title,
            running: app.history.pending_count(),
            test_mode: app.options.test_mode,
        });
        header.render(chunks[0], f.buffer_mut());
    }

    let log_percent = app.options.log_pane_percent;
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(100 - log_percent),
            Constraint::Percentage(log_percent),
        ])
        .split(chunks[1]);
    {
        let repl = ReplWidget::new(app, panes[0]);
        repl.render(panes[0], f.buffer_mut());
    }
    {
        let logs = LogWidget::new(app, panes[1]);
        logs.render(panes[1], f.buffer_mut());
    }

    let cursor_pos = {
        let composer = ComposerWidget::new(app, available_height);
        composer.render(chunks[2], f.buffer_mut());
        composer.cursor_pos(chunks[2])
    };
    if let Some(cursor_pos) = cursor_pos {
        f.set_cursor_position(cursor_pos);
    }

    render_footer(f, chunks[3], app);
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let available_width = usize::from(area.width);

    let right_text = format!(
        "{} entries  {} ",
        app.history.len(),
        chrono::Local::now().format("%H:%M:%S")
    );
    let right_width = right_text.width();

    let (left_text, left_style) = match app.status_message.as_deref() {
        Some(msg) => (msg, Style::default().fg(palette::STATUS_INFO)),
        None => (KEY_HINTS, Style::default().fg(palette::TEXT_DIM)),
    };
    let max_left = available_width.saturating_sub(right_width + 1);
    let left = truncate_line_to_width(left_text, max_left);
    let spacer = available_width.saturating_sub(left.width() + 1 + right_width);

    let mut spans = vec![Span::raw(" "), Span::styled(left, left_style)];
    if available_width > right_width {
        spans.push(Span::raw(" ".repeat(spacer)));
        spans.push(Span::styled(
            right_text,
            Style::default().fg(palette::TEXT_MUTED),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
