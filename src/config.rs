//! # Configuration Management
//!
//! This module handles loading and managing application configuration from
//! multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, GEMINI_API_KEY, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// Breaking configuration into logical groups (server, gemini, audio, ...)
/// keeps each concern readable as the application grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub audio: AudioConfig,
    pub speaking: SpeakingConfig,
    pub storage: StorageConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Remote generative-language service settings.
///
/// ## Fields:
/// - `api_key`: API key for the service (usually via the GEMINI_API_KEY env var)
/// - `text_model`: fast model for topics, tests, and real-time feedback
/// - `reasoning_model`: stronger model for detailed evaluation reports
/// - `live_model`: bidirectional streaming model for the speaking examiner
/// - `tts_model`: speech-synthesis model for listening-test audio
/// - `voice`: prebuilt voice used by the live examiner and the TTS narrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub text_model: String,
    pub reasoning_model: String,
    pub live_model: String,
    pub tts_model: String,
    pub voice: String,
}

/// Audio pipeline settings.
///
/// Capture and playback run on two independent clocks: microphone input is
/// resampled to `capture_sample_rate` before streaming out, and examiner
/// speech arrives at `output_sample_rate`. No cross-clock synchronization is
/// attempted beyond the playback scheduler's monotonic cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate microphone audio is resampled to before streaming (Hz)
    pub capture_sample_rate: u32,

    /// Sample rate of synthesized speech coming back from the service (Hz)
    pub output_sample_rate: u32,

    /// Fixed number of samples per outbound frame
    pub frame_samples: usize,
}

/// Speaking-module defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakingConfig {
    /// Default practice duration in seconds when the client doesn't pick one
    pub default_duration_secs: u64,

    /// Default target band score (1-9)
    pub default_level: u8,
}

/// Where session-history files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON history file per practice module
    pub data_dir: String,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum number of concurrent live speaking sessions
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            gemini: GeminiConfig {
                api_key: String::new(),
                text_model: "gemini-2.5-flash".to_string(),
                reasoning_model: "gemini-2.5-pro".to_string(),
                live_model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
                tts_model: "gemini-2.5-flash-preview-tts".to_string(),
                voice: "Zephyr".to_string(),
            },
            audio: AudioConfig {
                capture_sample_rate: 16_000,
                output_sample_rate: 24_000,
                frame_samples: 4096,
            },
            speaking: SpeakingConfig {
                default_duration_secs: 5 * 60,
                default_level: 7,
            },
            storage: StorageConfig {
                data_dir: "data".to_string(),
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST, PORT and GEMINI_API_KEY
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Special environment variables used by deployment platforms and the
        // upstream service itself; these don't follow the APP_ prefix.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            settings = settings.set_override("gemini.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Audio rates and frame size are non-zero
    /// - At least one concurrent session is allowed
    ///
    /// An empty API key is allowed so the server can boot for local testing;
    /// remote calls will fail at the call site with a clear error instead.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.capture_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rates must be greater than 0"));
        }

        if self.audio.frame_samples == 0 {
            return Err(anyhow::anyhow!("Audio frame size must be greater than 0"));
        }

        if self.speaking.default_level == 0 || self.speaking.default_level > 9 {
            return Err(anyhow::anyhow!("Default level must be between 1 and 9"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// Allows partial updates: sending just `{"server": {"port": 9000}}`
    /// changes only the port. The API key is deliberately not updatable at
    /// runtime.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(gemini) = partial_config.get("gemini") {
            if let Some(model) = gemini.get("text_model").and_then(|v| v.as_str()) {
                self.gemini.text_model = model.to_string();
            }
            if let Some(model) = gemini.get("reasoning_model").and_then(|v| v.as_str()) {
                self.gemini.reasoning_model = model.to_string();
            }
            if let Some(voice) = gemini.get("voice").and_then(|v| v.as_str()) {
                self.gemini.voice = voice.to_string();
            }
        }

        if let Some(speaking) = partial_config.get("speaking") {
            if let Some(secs) = speaking.get("default_duration_secs").and_then(|v| v.as_u64()) {
                self.speaking.default_duration_secs = secs;
            }
            if let Some(level) = speaking.get("default_level").and_then(|v| v.as_u64()) {
                self.speaking.default_level = level as u8;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.capture_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.audio.frame_samples, 4096);
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.frame_samples = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.speaking.default_level = 10;
        assert!(config.validate().is_err());
    }

    /// The default configuration must stay expressible as a config.toml.
    #[test]
    fn test_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let rendered = toml::to_string(&config).unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("[gemini]"));

        let back: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(back.server.port, config.server.port);
        assert_eq!(back.audio.frame_samples, config.audio.frame_samples);
    }

    /// Test that runtime configuration updates work correctly.
    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"server": {"port": 9090}, "gemini": {"voice": "Puck"}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.gemini.voice, "Puck");
        // Other fields should remain unchanged
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.gemini.text_model, "gemini-2.5-flash");
    }
}
