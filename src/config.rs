//! Configuration file support.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Quiet period after the last keystroke before the text is searched.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// A lookup still running after this long is reported as failed.
pub const DEFAULT_REPOSITORY_TIMEOUT_MS: u64 = 5000;

/// Application configuration loaded from config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Notes database
    pub db_path: Option<PathBuf>,

    /// Settings file holding the persisted search conditions
    pub preferences_path: Option<PathBuf>,

    pub debounce_ms: u64,

    pub repository_timeout_ms: u64,

    /// Editor command used to change a note from the terminal
    pub editor: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            preferences_path: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            repository_timeout_ms: DEFAULT_REPOSITORY_TIMEOUT_MS,
            editor: None,
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {}", config_path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", config_path.display()))
    }

    /// Returns the path to the config file.
    ///
    /// Default: `~/.config/note-finder/config.toml`
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("note-finder")
            .join("config.toml")
    }

    /// Resolve the notes database, with CLI argument taking precedence.
    pub fn db_path(&self, cli_path: Option<&PathBuf>) -> PathBuf {
        cli_path
            .cloned()
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(crate::db::default_db_path)
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.preferences_path
            .clone()
            .unwrap_or_else(crate::prefs::default_preferences_path)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.repository_timeout_ms)
    }

    /// Resolve the editor command.
    ///
    /// Precedence order:
    /// 1. Config file `editor` setting
    /// 2. $EDITOR environment variable
    /// 3. $VISUAL environment variable
    /// 4. "vi" as fallback
    pub fn editor(&self) -> String {
        self.editor
            .clone()
            .or_else(|| std::env::var("EDITOR").ok())
            .or_else(|| std::env::var("VISUAL").ok())
            .unwrap_or_else(|| "vi".to_string())
    }
}
