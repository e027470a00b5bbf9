//! Hearth Gateway — a voice/text command gateway for smart home control
//!
//! Commands arrive over HTTP (raw audio, text, or an Alexa skill webhook),
//! pass through a bounded queue, and are processed one at a time:
//!
//! ```text
//! HTTP ingestion ─▶ bounded queue ─▶ pipeline
//!                                      ├─ speech-to-text   (Whisper)
//!                                      ├─ intent parsing   (Claude)
//!                                      ├─ target resolution (registry)
//!                                      ├─ execution w/retry (Home Assistant)
//!                                      └─ notification      (Pushover)
//! ```
//!
//! The registry keeps an in-memory snapshot of devices and scenes, refreshed
//! periodically from the backend; its summary is fed to the intent parser so
//! the model can name targets exactly.

pub mod api;
pub mod backend;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod intent;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod stt;

pub use config::Config;
pub use daemon::Daemon;
pub use domain::{Action, Command, Device, DeviceType, Scene, TEXT_COMMAND_PREFIX, TargetType};
pub use error::{Error, Result};
pub use pipeline::{IntentParser, Notifier, Pipeline, SpeechToText};
pub use registry::{Registry, RegistrySnapshot};
pub use retry::{RetryPolicy, with_retry};
