//! Configuration reading and data directory paths.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::coordinator::{CoordinatorSettings, DEFAULT_MODEL};
use crate::recording::WAV_FLOAT_MIME;
use crate::session::websocket::DEFAULT_ENDPOINT;
use paths::{get_data_dir, get_recordings_dir};

/// Environment variable that overrides `apiKey`.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// config.json shape. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub look_ahead_secs: f64,
    pub prompt_rate_limit_ms: u64,
    pub fade_ms: u64,
    /// Output device name; `None` for the system default.
    pub output_device: Option<String>,
    pub volume: f32,
    /// MIDI input id; `None` for the first available.
    pub midi_device: Option<String>,
    pub recording_dir: Option<PathBuf>,
    pub preferred_recording_mime: String,
    pub startup_active_prompts: usize,
    /// Prompt file loaded at startup instead of the stock bank.
    pub prompts_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            look_ahead_secs: 2.0,
            prompt_rate_limit_ms: 200,
            fade_ms: 100,
            output_device: None,
            volume: 1.0,
            midi_device: None,
            recording_dir: None,
            preferred_recording_mime: WAV_FLOAT_MIME.to_string(),
            startup_active_prompts: 3,
            prompts_file: None,
        }
    }
}

impl AppConfig {
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        let look_ahead = match Duration::try_from_secs_f64(self.look_ahead_secs) {
            Ok(d) if !d.is_zero() => d,
            _ => {
                warn!(value = self.look_ahead_secs, "Invalid lookAheadSecs, using default");
                CoordinatorSettings::default().look_ahead
            }
        };
        CoordinatorSettings {
            model: self.model.clone(),
            look_ahead,
            prompt_interval: Duration::from_millis(self.prompt_rate_limit_ms),
            fade: Duration::from_millis(self.fade_ms),
        }
    }

    pub fn recording_dir(&self) -> PathBuf {
        self.recording_dir
            .clone()
            .unwrap_or_else(get_recordings_dir)
    }

    /// Apply environment overrides.
    fn with_env(mut self, api_key: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        self
    }
}

/// Read config.json from the data directory, with env overrides.
pub fn read_app_config() -> AppConfig {
    let config: AppConfig = read_json_file(&get_config_path()).unwrap_or_default();
    config.with_env(std::env::var(API_KEY_ENV).ok())
}

/// Path to config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
