//! TOML configuration file loading
//!
//! All fields are optional — the file is a partial overlay on top of
//! defaults and environment variables.

use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// HTTP ingestion server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Whisper transcription
    #[serde(default)]
    pub openai: OpenAiFileConfig,

    /// Claude intent parsing
    #[serde(default)]
    pub anthropic: AnthropicFileConfig,

    /// Home Assistant backend
    #[serde(default)]
    pub home_assistant: HomeAssistantFileConfig,

    /// Pushover notifications
    #[serde(default)]
    pub pushover: PushoverFileConfig,
}

/// Ingestion server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Listen address (e.g. "0.0.0.0:8080")
    pub addr: Option<String>,

    /// Shared secret for the voice-skill webhook
    pub webhook_secret: Option<String>,

    /// Ingestion queue capacity
    pub queue_capacity: Option<usize>,

    /// Requests allowed per client per window
    pub rate_limit: Option<u32>,

    /// Rate-limit window in seconds
    pub rate_window_secs: Option<u64>,

    /// Seconds granted to in-flight requests at shutdown
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenAiFileConfig {
    pub api_key: Option<String>,

    /// Transcription language hint (e.g. "es")
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnthropicFileConfig {
    pub api_key: Option<String>,

    /// Model identifier (e.g. "claude-sonnet-4-20250514")
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HomeAssistantFileConfig {
    /// Base URL of the Home Assistant instance
    pub url: Option<String>,

    /// Long-lived access token
    pub token: Option<String>,

    /// Seconds between registry syncs
    pub sync_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PushoverFileConfig {
    pub enabled: Option<bool>,
    pub token: Option<String>,
    pub user_key: Option<String>,
}

impl GatewayConfigFile {
    /// Load and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}
