//! Preferences store for the persisted search conditions.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;

const SEARCH_CONDITIONS_KEY: &str = "search_conditions";

/// Synchronous, local key/value storage owned by the host application.
pub trait PreferencesStore {
    /// The serialized conditions, or None if nothing was ever saved.
    fn load_filter_conditions(&self) -> Option<String>;

    fn save_filter_conditions(&mut self, serialized: &str) -> Result<()>;
}

/// Default settings file: `<config dir>/note-finder/settings.json`.
pub fn default_preferences_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("note-finder")
        .join("settings.json")
}

/// JSON object on disk; other keys in the file are left untouched on save.
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_settings(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read settings: {}", self.path.display()))?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            _ => {
                tracing::warn!("Ignoring unreadable settings file {}", self.path.display());
                Ok(Map::new())
            }
        }
    }
}

impl PreferencesStore for FilePreferences {
    fn load_filter_conditions(&self) -> Option<String> {
        let settings = self
            .read_settings()
            .map_err(|e| tracing::warn!("{e:#}"))
            .ok()?;
        settings
            .get(SEARCH_CONDITIONS_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    fn save_filter_conditions(&mut self, serialized: &str) -> Result<()> {
        let mut settings = self.read_settings()?;
        settings.insert(SEARCH_CONDITIONS_KEY.to_string(), Value::String(serialized.to_string()));
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(&Value::Object(settings))?;

        // Write beside the target, then rename, so a crash never leaves half a file.
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("failed to write settings: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to replace settings: {}", self.path.display()))
    }
}
