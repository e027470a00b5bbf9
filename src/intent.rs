//! Intent parsing via the Anthropic Messages API
//!
//! The registry summary is embedded in the system prompt so the model can
//! echo exact device and scene names back; resolution still happens against
//! the registry afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{Action, Command, TargetType};
use crate::pipeline::IntentParser;
use crate::retry::{RetryPolicy, is_retryable_status, with_retry};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 256;

/// Claude-backed natural-language command parser
pub struct ClaudeParser {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ClaudeParser {
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the API key is empty.
    pub fn new(api_key: &str, model: Option<&str>, cancel: CancellationToken) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("Anthropic API key is required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            retry: RetryPolicy::default(),
            cancel,
        })
    }

    /// Point the client at a different API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = if is_retryable_status(status) {
                " (retryable)"
            } else {
                ""
            };
            return Err(Error::Intent(format!(
                "model API returned {status}{retryable}: {body}"
            )));
        }

        Ok(response.json().await?)
    }
}

fn system_prompt(registry_summary: &str) -> String {
    format!(
        r#"You are a smart home assistant. Your task is to interpret voice commands and extract the intent.

{registry_summary}

IMPORTANT:
- If the user mentions a scene, use target_type "scene"
- If the user mentions a device, use target_type "device"
- Use the EXACT name of the device or scene as it appears in the list
- If you don't understand the command, use action "unknown"
- The user may speak in English or Spanish, understand both

Respond ONLY with valid JSON (no markdown, no backticks):
{{
  "action": "turn_on|turn_off|set_level|set_color|run_scene|get_status|unknown",
  "target_name": "exact device or scene name",
  "target_type": "device|scene",
  "parameters": {{"level": 50, "color": "red"}},
  "confidence": 0.95
}}"#
    )
}

/// Strip markdown code fences the model sometimes wraps around the JSON
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Decode the model's reply into a [`Command`].
///
/// # Errors
///
/// Returns [`Error::Intent`] when the reply is not the expected JSON shape.
fn decode_intent(reply: &str, raw_text: &str) -> Result<Command> {
    let json = strip_fences(reply);
    let intent: ParsedIntent = serde_json::from_str(json)
        .map_err(|e| Error::Intent(format!("parsing intent JSON ({json}): {e}")))?;

    Ok(Command {
        action: intent.action,
        target_name: intent.target_name,
        target_id: String::new(),
        target_type: intent.target_type,
        parameters: intent.parameters,
        raw_text: raw_text.to_string(),
        confidence: intent.confidence,
    })
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ParsedIntent {
    action: Action,
    #[serde(default)]
    target_name: String,
    #[serde(default)]
    target_type: TargetType,
    #[serde(default)]
    parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    confidence: f64,
}

#[async_trait::async_trait]
impl IntentParser for ClaudeParser {
    async fn parse(&self, text: &str, registry_summary: &str) -> Result<Command> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: system_prompt(registry_summary),
            messages: vec![Message {
                role: "user",
                content: text,
            }],
        };

        let response =
            with_retry(&self.cancel, &self.retry, || self.request(&request)).await?;

        let reply = response
            .content
            .first()
            .map(|block| block.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Intent("empty response from model".to_string()))?;

        decode_intent(reply, text)
    }
}
