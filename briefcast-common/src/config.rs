//! Configuration loading
//!
//! Resolution priority, per field group:
//! 1. Environment variable (secrets and deployment overrides)
//! 2. TOML config file (`BRIEFCAST_CONFIG` or `./briefcast.toml`)
//! 3. Compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Text-generation service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TextGenConfig {
    pub api_base: String,
    pub api_key: String,
    /// Model for script synthesis
    pub model: String,
    /// Small/fast model for topic classification
    pub fast_model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for TextGenConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            fast_model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 8192,
            timeout_secs: 120,
        }
    }
}

/// Speech synthesis service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_voice: String,
    /// Hard per-request character ceiling of the speech service
    pub chunk_ceiling: usize,
    pub stability: f32,
    pub similarity_boost: f32,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io".to_string(),
            api_key: String::new(),
            default_voice: "21m00Tcm4TlvDq8ikWAM".to_string(),
            chunk_ceiling: 4000,
            stability: 0.5,
            similarity_boost: 0.75,
            timeout_secs: 120,
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Upload endpoint, `PUT {endpoint}/{key}`
    pub endpoint: String,
    pub api_token: String,
    /// Public base URL the uploaded key is served under
    pub public_base: String,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000/briefcast".to_string(),
            api_token: String::new(),
            public_base: "http://127.0.0.1:9000/briefcast".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Music bed assets and mixing subprocess limits
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub intro_bed: Option<PathBuf>,
    pub outro_bed: Option<PathBuf>,
    pub epilogue_bed: Option<PathBuf>,
    /// Optional closing script synthesized and appended after the main mix
    pub epilogue_script: Option<String>,
    pub subprocess_timeout_secs: Option<u64>,
}

impl AudioConfig {
    pub fn subprocess_timeout_secs(&self) -> u64 {
        self.subprocess_timeout_secs.unwrap_or(120)
    }
}

/// Safe content fetcher limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    /// Word budget for extracted body text fed into prompting
    pub max_words: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_redirects: 5,
            max_body_bytes: 2 * 1024 * 1024,
            max_words: 1500,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub text_gen: TextGenConfig,
    pub tts: TtsConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    pub fetch: FetchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 5731,
            database_path: PathBuf::from("briefcast.db"),
            text_gen: TextGenConfig::default(),
            tts: TtsConfig::default(),
            storage: StorageConfig::default(),
            audio: AudioConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("BRIEFCAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("briefcast.toml"));

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot operate with
    fn validate(&self) -> Result<()> {
        if self.tts.chunk_ceiling == 0 {
            return Err(Error::Config(
                "tts.chunk_ceiling must be greater than zero".to_string(),
            ));
        }
        if self.fetch.max_body_bytes == 0 {
            return Err(Error::Config(
                "fetch.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Environment overrides, mainly for secrets kept out of the config file
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("BRIEFCAST_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(db) = std::env::var("BRIEFCAST_DB") {
            self.database_path = PathBuf::from(db);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.text_gen.api_key = key;
        }
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            self.tts.api_key = key;
        }
        if let Ok(token) = std::env::var("BRIEFCAST_STORAGE_TOKEN") {
            self.storage.api_token = token;
        }
    }
}
