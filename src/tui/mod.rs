//! Terminal UI for the console.

pub mod app;
pub mod clipboard;
pub mod input_history;
pub mod ui;
pub mod widgets;

pub use app::{App, TuiOptions};
pub use ui::run_tui;
