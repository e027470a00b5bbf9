//! Gateway configuration
//!
//! Resolution order per field: environment variable, then config file, then
//! built-in default. Secrets are expected from the environment in typical
//! deployments; the file covers everything else.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::Result;
use file::GatewayConfigFile;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_QUEUE_CAPACITY: usize = 10;
const DEFAULT_RATE_LIMIT: u32 = 30;
const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_LANGUAGE: &str = "es";
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Fully-resolved gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub anthropic: AnthropicConfig,
    pub home_assistant: HomeAssistantConfig,
    pub pushover: PushoverConfig,
}

/// HTTP ingestion server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,

    /// Shared secret for the voice-skill webhook; `None` disables the check
    pub webhook_secret: Option<String>,

    /// Ingestion queue capacity
    pub queue_capacity: usize,

    /// Requests allowed per client per window
    pub rate_limit: u32,

    /// Rate-limit window
    pub rate_window: Duration,

    /// Time granted to in-flight requests at shutdown
    pub shutdown_grace: Duration,
}

/// Whisper transcription configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key; `None` disables transcription (text-only mode)
    pub api_key: Option<String>,

    /// Transcription language hint
    pub language: String,
}

/// Claude intent-parsing configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key; required to run the gateway
    pub api_key: Option<String>,

    /// Model identifier; `None` uses the parser's default
    pub model: Option<String>,
}

/// Home Assistant backend configuration
#[derive(Debug, Clone)]
pub struct HomeAssistantConfig {
    /// Base URL of the instance
    pub url: Option<String>,

    /// Long-lived access token; required to run the gateway
    pub token: Option<String>,

    /// Interval between registry syncs
    pub sync_interval: Duration,
}

/// Pushover notification configuration
#[derive(Debug, Clone)]
pub struct PushoverConfig {
    pub enabled: bool,
    pub token: Option<String>,
    pub user_key: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Resolve configuration from an optional file plus the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is given but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => GatewayConfigFile::load(path)?,
            None => GatewayConfigFile::default(),
        };
        Ok(Self::resolve(fc))
    }

    fn resolve(fc: GatewayConfigFile) -> Self {
        Self {
            server: ServerConfig {
                addr: env_var("HEARTH_ADDR")
                    .or(fc.server.addr)
                    .unwrap_or_else(|| DEFAULT_ADDR.to_string()),
                webhook_secret: env_var("HEARTH_WEBHOOK_SECRET").or(fc.server.webhook_secret),
                queue_capacity: fc.server.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
                rate_limit: fc.server.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
                rate_window: fc
                    .server
                    .rate_window_secs
                    .map_or(DEFAULT_RATE_WINDOW, Duration::from_secs),
                shutdown_grace: fc
                    .server
                    .shutdown_grace_secs
                    .map_or(DEFAULT_SHUTDOWN_GRACE, Duration::from_secs),
            },
            openai: OpenAiConfig {
                api_key: env_var("OPENAI_API_KEY").or(fc.openai.api_key),
                language: fc
                    .openai
                    .language
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            },
            anthropic: AnthropicConfig {
                api_key: env_var("ANTHROPIC_API_KEY").or(fc.anthropic.api_key),
                model: fc.anthropic.model,
            },
            home_assistant: HomeAssistantConfig {
                url: env_var("HASS_URL").or(fc.home_assistant.url),
                token: env_var("HASS_TOKEN").or(fc.home_assistant.token),
                sync_interval: fc
                    .home_assistant
                    .sync_interval_secs
                    .map_or(DEFAULT_SYNC_INTERVAL, Duration::from_secs),
            },
            pushover: PushoverConfig {
                enabled: fc.pushover.enabled.unwrap_or(false),
                token: env_var("PUSHOVER_TOKEN").or(fc.pushover.token),
                user_key: env_var("PUSHOVER_USER_KEY").or(fc.pushover.user_key),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = Config::resolve(GatewayConfigFile::default());

        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.server.queue_capacity, 10);
        assert_eq!(config.server.rate_limit, 30);
        assert_eq!(config.server.rate_window, Duration::from_secs(60));
        assert_eq!(config.openai.language, "es");
        assert_eq!(config.home_assistant.sync_interval, Duration::from_secs(300));
        assert!(!config.pushover.enabled);
    }

    #[test]
    fn file_values_overlay_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
addr = "127.0.0.1:9090"
queue_capacity = 32
rate_limit = 5
rate_window_secs = 10

[openai]
language = "en"

[home_assistant]
url = "http://hass.local:8123"
sync_interval_secs = 60

[pushover]
enabled = true
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.server.addr, "127.0.0.1:9090");
        assert_eq!(config.server.queue_capacity, 32);
        assert_eq!(config.server.rate_limit, 5);
        assert_eq!(config.server.rate_window, Duration::from_secs(10));
        assert_eq!(config.openai.language, "en");
        assert_eq!(
            config.home_assistant.url.as_deref(),
            Some("http://hass.local:8123")
        );
        assert_eq!(config.home_assistant.sync_interval, Duration::from_secs(60));
        assert!(config.pushover.enabled);
        // untouched sections keep their defaults
        assert_eq!(config.server.shutdown_grace, Duration::from_secs(10));
    }

    #[test]
    fn partial_sections_are_fine() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server]\nrate_limit = 2\n").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.rate_limit, 2);
        assert_eq!(config.server.queue_capacity, 10);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server\naddr=").unwrap();

        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/hearth.toml"))).is_err());
    }
}
