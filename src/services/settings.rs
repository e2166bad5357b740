use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming an optional JSON settings file.
pub const SETTINGS_ENV: &str = "ECHO_SESSIONS_SETTINGS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub reply_delay_ms: u64,
    pub default_title: String,
    pub show_archived: bool,
    /// `{prompt}` is replaced with the user's message.
    pub reply_template: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            reply_delay_ms: 1500,
            default_title: "New conversation".to_string(),
            show_archived: false,
            reply_template: "You said: \"{prompt}\". This is a simulated response.".to_string(),
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    /// Parse settings, falling back to defaults on malformed input.
    pub fn from_json(json: &str) -> AppSettings {
        match serde_json::from_str(json) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring malformed settings: {}", e);
                AppSettings::default()
            }
        }
    }

    pub fn load_file(path: &Path) -> AppSettings {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) => {
                tracing::debug!("No settings at {}: {}", path.display(), e);
                AppSettings::default()
            }
        }
    }

    /// Load from the file named by `ECHO_SESSIONS_SETTINGS`, or defaults.
    pub fn load() -> AppSettings {
        match std::env::var(SETTINGS_ENV) {
            Ok(path) => Self::load_file(Path::new(&path)),
            Err(_) => AppSettings::default(),
        }
    }

    pub fn save(path: &Path, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}
