//! Domain model: commands, devices, and scenes

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Marker prefix distinguishing already-transcribed text from raw audio on
/// the shared ingestion queue.
pub const TEXT_COMMAND_PREFIX: &str = "__TEXT__:";

/// If `payload` carries the text-command prefix, return the text after it.
///
/// Text submissions (the `/text` endpoint, voice-skill webhooks) share the
/// audio queue; the prefix lets the pipeline skip transcription for them.
#[must_use]
pub fn strip_text_prefix(payload: &[u8]) -> Option<&str> {
    let prefix = TEXT_COMMAND_PREFIX.as_bytes();
    if payload.len() > prefix.len() && payload.starts_with(prefix) {
        std::str::from_utf8(&payload[prefix.len()..]).ok()
    } else {
        None
    }
}

/// Action a command performs on its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TurnOn,
    TurnOff,
    SetLevel,
    SetColor,
    RunScene,
    GetStatus,
    /// The parser could not map the utterance to any action
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
            Self::SetLevel => "set_level",
            Self::SetColor => "set_color",
            Self::RunScene => "run_scene",
            Self::GetStatus => "get_status",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// What kind of entity a command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[default]
    Device,
    Scene,
}

/// A parsed voice/text command
///
/// `target_id` is empty until the target has been resolved against the
/// registry; commands with [`Action::Unknown`] are dropped before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: Action,
    pub target_name: String,
    #[serde(default)]
    pub target_id: String,
    pub target_type: TargetType,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub raw_text: String,
    /// Parser-reported confidence, conventionally 0–1 but not enforced
    #[serde(default)]
    pub confidence: f64,
}

/// Device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Light,
    Plug,
    Switch,
    Thermostat,
    Sensor,
    Other,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Light => "light",
            Self::Plug => "plug",
            Self::Switch => "switch",
            Self::Thermostat => "thermostat",
            Self::Sensor => "sensor",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Capability descriptor reported by the backend for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFunction {
    pub code: String,
    pub kind: String,
    #[serde(default)]
    pub values: HashMap<String, serde_json::Value>,
}

/// A controllable device
///
/// Immutable once constructed; a registry sync builds entirely new values
/// rather than mutating existing ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    /// Backend-specific classification string (e.g. the entity domain)
    pub category: String,
    pub online: bool,
    #[serde(default)]
    pub functions: Vec<DeviceFunction>,
}

/// A backend-defined scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub home_id: Option<String>,
}
