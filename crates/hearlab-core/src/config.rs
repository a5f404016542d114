//! TOML-based application configuration.
//!
//! Stores the API endpoint, participant bookkeeping, and playback device
//! preferences. Configuration is stored at `~/.config/hearlab/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::session::Participant;

/// API collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Participant identity and consent state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParticipantConfig {
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub consent: bool,
}

impl ParticipantConfig {
    pub fn to_participant(&self) -> Participant {
        Participant {
            id: self.participant_id.clone(),
            consent: self.consent,
        }
    }
}

/// Playback device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Whether the device can hold decoded audio buffers. When false the
    /// buffered backend is never selected.
    #[serde(default = "default_true")]
    pub device_capable: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device_capable: default_true(),
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/hearlab/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub participant: ParticipantConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

impl Config {
    /// Default config file location: `~/.config/hearlab/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hearlab")
            .join("config.toml")
    }

    /// Load from `path`, falling back to defaults when the file does not
    /// exist yet.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
        }
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(path, raw).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_path())
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/experiment/".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
