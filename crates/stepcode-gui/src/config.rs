//! App config persistence

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stepcode_core::{SequencerConfig, Tempo};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Initial tempo in BPM
    pub tempo: f64,
    pub sequencer: SequencerConfig,
    pub audio: AudioConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tempo: Tempo::default().bpm(),
            sequencer: SequencerConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub volume_db: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { volume_db: -6.0 }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stepcode")
        .join("config.toml")
}

/// Parse config text, falling back to defaults when malformed
pub fn parse_config(text: &str) -> AppConfig {
    toml::from_str(text).unwrap_or_else(|e| {
        warn!("Ignoring malformed config: {}", e);
        AppConfig::default()
    })
}

pub fn load_config() -> AppConfig {
    let path = config_path();
    let Ok(text) = std::fs::read_to_string(&path) else {
        debug!(path = %path.display(), "No config file, using defaults");
        return AppConfig::default();
    };
    parse_config(&text)
}

pub fn save_config(config: &AppConfig) {
    write_config(config, &config_path());
}

/// Write `config` to `path`, creating parent directories; returns whether it was saved
fn write_config(config: &AppConfig, path: &Path) -> bool {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), "Failed to create config directory: {}", e);
            return false;
        }
    }
    let text = match toml::to_string_pretty(config) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize config: {}", e);
            return false;
        }
    };
    if let Err(e) = std::fs::write(path, text) {
        warn!(path = %path.display(), "Failed to save config: {}", e);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepcode_core::WrapPolicy;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = parse_config("tempo = 96.0\n\n[sequencer]\nwrap_policy = \"loop\"\n");
        assert_eq!(config.tempo, 96.0);
        assert_eq!(config.sequencer.wrap_policy, WrapPolicy::Loop);
        assert_eq!(config.sequencer.steps_per_beat, 2);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_malformed_config_falls_back() {
        assert_eq!(parse_config("tempo = \"fast\""), AppConfig::default());
        assert_eq!(parse_config(""), AppConfig::default());
    }

    #[test]
    fn test_saved_text_parses_back() {
        let mut config = AppConfig::default();
        config.audio.volume_db = -12.0;
        config.sequencer.lookahead_secs = 0.2;
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("[audio]"));
        assert_eq!(parse_config(&text), config);
    }

    #[test]
    fn test_write_config_creates_directory() {
        let dir = std::env::temp_dir().join(format!("stepcode-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.tempo = 90.0;

        assert!(write_config(&config, &path));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(parse_config(&text), config);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_config_reports_unusable_directory() {
        let blocker = std::env::temp_dir().join(format!("stepcode-blocker-{}", std::process::id()));
        std::fs::write(&blocker, "not a directory").unwrap();

        // Parent path runs through a regular file
        let path = blocker.join("stepcode").join("config.toml");
        assert!(!write_config(&AppConfig::default(), &path));
        assert!(!path.exists());
        std::fs::remove_file(&blocker).unwrap();
    }
}
