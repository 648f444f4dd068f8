//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default encoding settings.
    pub encoding: EncodingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingDefaults {
    /// Target video bitrate for stream encoding (bits per second).
    pub video_bitrate_bps: u32,

    /// Target bitrate for lossy audio output (kbps).
    pub audio_bitrate_kbps: u32,

    /// Delay between natural end of playback and stopping the encoder.
    pub settle_delay_ms: u64,

    /// Display refresh rate used by the frame scheduler.
    pub fps: u32,

    /// Resolution of waveform peak envelopes.
    pub peak_buckets: usize,

    /// Output sample rate of the offline mixer.
    pub mix_sample_rate: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "clipforge=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EncodingDefaults {
    fn default() -> Self {
        Self {
            video_bitrate_bps: 8_000_000,
            audio_bitrate_kbps: 128,
            settle_delay_ms: 1500,
            fps: 30,
            peak_buckets: 2000,
            mix_sample_rate: 44_100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EncodingDefaults {
    /// Settle delay as a `Duration`.
    pub fn settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_delay_ms)
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match Self::from_json(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Parse a config document. Missing fields take their defaults.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("clipforge").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = AppConfig::default();
        assert_eq!(config.encoding.video_bitrate_bps, 8_000_000);
        assert_eq!(config.encoding.settle_delay_ms, 1500);
        assert_eq!(config.encoding.mix_sample_rate, 44_100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = AppConfig::from_json(r#"{"encoding":{"fps":60}}"#).unwrap();
        assert_eq!(config.encoding.fps, 60);
        assert_eq!(config.encoding.peak_buckets, 2000);
        assert!(!config.logging.json);
    }
}
