//! Console configuration.
//!
//! Loaded from `<config_dir>/starlark-console/config.toml` unless a path is
//! given on the command line. Every field is optional.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::exec::SeedValue;

const APP_DIR: &str = "starlark-console";

/// Value of one `[bindings]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&BindingValue> for SeedValue {
    fn from(value: &BindingValue) -> Self {
        match value {
            BindingValue::Bool(b) => SeedValue::Bool(*b),
            BindingValue::Int(n) => SeedValue::Int(*n),
            BindingValue::Float(f) => SeedValue::Float(*f),
            BindingValue::Str(s) => SeedValue::Str(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Title shown in the header bar
    pub app_title: String,
    /// trace, debug, info, warn or error
    pub log_level: String,
    /// Also append log lines to this file
    pub log_file: Option<PathBuf>,
    /// Input history file; defaults to the data directory
    pub history_file: Option<PathBuf>,
    /// Maximum number of input history entries to keep
    pub max_input_history: usize,
    /// Maximum number of execution records kept in the REPL pane
    pub max_records: usize,
    /// Maximum number of lines kept in the log pane
    pub max_log_lines: usize,
    /// Log pane width as percentage of terminal width
    pub log_pane_percent: u16,
    /// Text shown in the REPL pane before the first submission
    pub startup_message: Option<String>,
    /// Use the alternate screen
    pub alternate_screen: bool,
    /// Variables defined before the first submission
    pub bindings: BTreeMap<String, BindingValue>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_title: "Starlark Console".to_string(),
            log_level: "debug".to_string(),
            log_file: None,
            history_file: None,
            max_input_history: 200,
            max_records: crate::exec::DEFAULT_MAX_RECORDS,
            max_log_lines: 2_000,
            log_pane_percent: 45,
            startup_message: None,
            alternate_screen: true,
            bindings: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Default config file path.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to resolve config directory: not found.")?
            .join(APP_DIR);
        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path`, or from the default location. A missing file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(10..=80).contains(&self.log_pane_percent) {
            anyhow::bail!(
                "Invalid log_pane_percent {}: expected a number between 10 and 80.",
                self.log_pane_percent
            );
        }
        for name in self.bindings.keys() {
            if !is_identifier(name) {
                anyhow::bail!("Invalid binding name '{name}': not an identifier.");
            }
        }
        Ok(())
    }

    /// Resolved input history path, if one can be determined.
    #[must_use]
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_file
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join(APP_DIR).join("input_history")))
    }

    /// Seed values for the binding environment.
    #[must_use]
    pub fn seed_bindings(&self) -> BTreeMap<String, SeedValue> {
        self.bindings
            .iter()
            .map(|(name, value)| (name.clone(), SeedValue::from(value)))
            .collect()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
