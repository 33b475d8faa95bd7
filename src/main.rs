//! CLI entry point for the Starlark console.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

mod config;
mod demo;
mod error;
mod exec;
mod logging;
mod palette;
mod tui;

use crate::config::Config;
use crate::error::ConsoleError;
use crate::exec::{
    Console, ExitSignal, History, RecordStatus, RedrawSignal, SubmitOutcome, WorkerConfig,
};
use crate::logging::LogStore;
use crate::tui::input_history::InputHistory;
use crate::tui::{App, TuiOptions};

#[derive(Parser, Debug)]
#[command(
    name = "starlark-console",
    author,
    version,
    about = "Interactive Starlark console with a live log pane",
    long_about = "Interactive Starlark console.\n\nGuest code runs on a dedicated worker thread; its output, value or error lands in the REPL pane while logs stream alongside."
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level for the log pane and log file (trace, debug, info, warn, error)
    #[arg(short, long = "loglevel")]
    loglevel: Option<String>,

    /// Also write logs to this file
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Emit fake device log lines once per second
    #[arg(long)]
    test_mode: bool,

    /// Title shown in the header bar
    #[arg(long)]
    title: Option<String>,

    /// Disable the alternate screen buffer (inline mode)
    #[arg(long = "no-alt-screen")]
    no_alt_screen: bool,

    /// Evaluate one snippet, print its output and exit
    #[arg(short, long)]
    eval: Option<String>,
}

fn load_config_from_cli(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = &cli.loglevel {
        config.log_level.clone_from(level);
    }
    if let Some(path) = &cli.logfile {
        config.log_file = Some(path.clone());
    }
    if let Some(title) = &cli.title {
        config.app_title.clone_from(title);
    }
    if cli.no_alt_screen {
        config.alternate_screen = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            match err.downcast_ref::<ConsoleError>() {
                Some(console_err) if console_err.is_fatal() => {
                    eprintln!(
                        "starlark-console: fatal {:?} error: {err:#}",
                        console_err.category()
                    );
                }
                _ => eprintln!("starlark-console: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config_from_cli(&cli)?;

    let redraw = RedrawSignal::new();
    let exit = ExitSignal::new();
    let log_store = LogStore::new(config.max_log_lines, redraw.clone());
    logging::init(&config.log_level, config.log_file.as_deref(), log_store.clone())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting console");

    let mut console = Console::start(
        WorkerConfig {
            seed: config.seed_bindings(),
        },
        redraw,
        exit,
    )?;
    let mut history = History::new(config.max_records);

    if let Some(source) = cli.eval.as_deref() {
        return run_eval(&mut console, &mut history, source).await;
    }

    let input_history = load_input_history(&config);
    let startup_message = config.startup_message.clone().or_else(|| {
        cli.test_mode.then(|| {
            "Test mode: fake device logs stream into the log pane. Try log(\"hello\").".to_string()
        })
    });
    let options = TuiOptions {
        title: config.app_title.clone(),
        use_alt_screen: config.alternate_screen,
        test_mode: cli.test_mode,
        startup_message,
        log_pane_percent: config.log_pane_percent,
    };
    let app = App::new(options, history, input_history, log_store);
    tui::run_tui(app, console).await?;
    Ok(ExitCode::SUCCESS)
}

fn load_input_history(config: &Config) -> InputHistory {
    let Some(path) = config.history_path() else {
        return InputHistory::in_memory(config.max_input_history);
    };
    match InputHistory::load(&path, config.max_input_history) {
        Ok(history) => history,
        Err(err) => {
            tracing::warn!("{err:#}; input history will not persist");
            InputHistory::in_memory(config.max_input_history)
        }
    }
}

/// Evaluate `source` once and print what the REPL pane would show.
async fn run_eval(console: &mut Console, history: &mut History, source: &str) -> Result<ExitCode> {
    let handle = match console.submit(source, history)? {
        SubmitOutcome::Submitted(handle) => handle,
        SubmitOutcome::Ignored | SubmitOutcome::Exit => return Ok(ExitCode::SUCCESS),
    };
    let record = console
        .wait_for(handle.id(), history)
        .await?
        .context("evaluation record was discarded")?;

    let mut stdout = io::stdout().lock();
    write!(stdout, "{}", record.stdout_capture())?;
    if let Some(result) = record.result_text() {
        writeln!(stdout, "{result}")?;
    }
    stdout.flush()?;

    let mut stderr = io::stderr().lock();
    write!(stderr, "{}", record.stderr_capture())?;
    if let Some(exception) = record.exception_text() {
        writeln!(stderr, "{exception}")?;
    }
    stderr.flush()?;

    Ok(match record.status() {
        RecordStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
