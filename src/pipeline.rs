//! Command pipeline: the single consumer of the ingestion queue
//!
//! One payload is fully processed — transcription, intent parsing, target
//! resolution, execution, notification — before the next is dequeued, so
//! side effects on the backend follow queue arrival order. Per-command
//! failures are logged and never stop the loop; only cancellation (or queue
//! closure at shutdown) does.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::DeviceBackend;
use crate::domain::{self, Action, Command, TargetType};
use crate::registry::Registry;
use crate::retry::{RetryPolicy, with_retry};
use crate::{Error, Result};

/// Remote speech-to-text collaborator
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe encoded audio bytes to text
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Stub for text-only deployments with no transcription capability
pub struct NoopSpeechToText;

#[async_trait]
impl SpeechToText for NoopSpeechToText {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        Err(Error::Stt(
            "no speech-to-text configured; submit text commands instead".to_string(),
        ))
    }
}

/// Remote natural-language intent parser
#[async_trait]
pub trait IntentParser: Send + Sync {
    /// Parse an utterance into a [`Command`], given the rendered registry
    /// summary as prompt context
    async fn parse(&self, text: &str, registry_summary: &str) -> Result<Command>;
}

/// Best-effort outbound notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Notifier that discards everything
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Orchestrates one command at a time from queue payload to device action
pub struct Pipeline {
    stt: Arc<dyn SpeechToText>,
    intent: Arc<dyn IntentParser>,
    backend: Arc<dyn DeviceBackend>,
    registry: Arc<Registry>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators
    #[must_use]
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        intent: Arc<dyn IntentParser>,
        backend: Arc<dyn DeviceBackend>,
        registry: Arc<Registry>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            stt,
            intent,
            backend,
            registry,
            notifier,
            retry,
        }
    }

    /// Consume the ingestion queue until cancellation or queue closure.
    ///
    /// Per-command errors are logged and the loop continues; a command
    /// failure never stops the pipeline.
    pub async fn run(&self, mut rx: mpsc::Receiver<Vec<u8>>, cancel: CancellationToken) {
        tracing::info!("pipeline ready, waiting for commands");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("pipeline stopping");
                    break;
                }
                payload = rx.recv() => match payload {
                    Some(payload) => {
                        if let Err(err) = self.process_one(&payload, &cancel).await {
                            tracing::error!(error = %err, "processing command");
                        }
                    }
                    None => {
                        tracing::info!("ingestion queue closed, pipeline stopping");
                        break;
                    }
                },
            }
        }
    }

    /// Process a single queued payload end to end.
    ///
    /// # Errors
    ///
    /// Returns the failure after logging and attempting a best-effort
    /// failure notification; callers treat this as a per-command error.
    pub async fn process_one(&self, payload: &[u8], cancel: &CancellationToken) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }

        let text = if let Some(direct) = domain::strip_text_prefix(payload) {
            tracing::info!(text = %direct, "received text command");
            direct.to_string()
        } else {
            tracing::info!(bytes = payload.len(), "received audio");
            let transcribed = self.stt.transcribe(payload).await?;
            tracing::info!(text = %transcribed, "transcribed");
            transcribed
        };

        let cmd = self.intent.parse(&text, &self.registry.summary()).await?;

        tracing::info!(
            action = %cmd.action,
            target = %cmd.target_name,
            confidence = cmd.confidence,
            "parsed intent"
        );

        if cmd.action == Action::Unknown {
            tracing::warn!(text = %text, "unknown command, skipping");
            return Ok(());
        }

        match self.execute(cmd, cancel).await {
            Ok(outcome) => {
                if let Err(err) = self.notifier.notify(&outcome).await {
                    tracing::error!(error = %err, "notifying result");
                }
                Ok(())
            }
            Err(err) => {
                let message = format!("Error: {err}");
                if let Err(notify_err) = self.notifier.notify(&message).await {
                    tracing::error!(error = %notify_err, "notifying error");
                }
                Err(err)
            }
        }
    }

    /// Resolve the target and dispatch the action, wrapped in the retry
    /// executor. Returns a human-readable outcome for the notifier.
    async fn execute(&self, mut cmd: Command, cancel: &CancellationToken) -> Result<String> {
        match cmd.target_type {
            TargetType::Scene => {
                let scene = self
                    .registry
                    .find_scene_by_name(&cmd.target_name)
                    .ok_or_else(|| Error::NotFound(format!("scene: {}", cmd.target_name)))?;

                with_retry(cancel, &self.retry, || {
                    self.backend.trigger_scene(&scene.id)
                })
                .await?;

                Ok(format!("Scene '{}' executed", cmd.target_name))
            }
            TargetType::Device => {
                let device = self
                    .registry
                    .find_device_by_name(&cmd.target_name)
                    .ok_or_else(|| Error::NotFound(format!("device: {}", cmd.target_name)))?;

                cmd.target_id = device.id;
                let cmd = &cmd;
                with_retry(cancel, &self.retry, || self.backend.execute_command(cmd)).await?;

                Ok(format!(
                    "Command '{}' executed on '{}'",
                    cmd.action, cmd.target_name
                ))
            }
        }
    }
}
