//! Daemon wiring: build every collaborator from configuration and run the
//! ingestion server and pipeline until cancellation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{ApiServer, ApiState, IngestQueue, rate_limit::RateLimiter};
use crate::backend::{DeviceBackend, HomeAssistantClient};
use crate::config::Config;
use crate::intent::ClaudeParser;
use crate::notify::PushoverNotifier;
use crate::pipeline::{NoopNotifier, NoopSpeechToText, Notifier, Pipeline, SpeechToText};
use crate::registry::Registry;
use crate::retry::RetryPolicy;
use crate::stt::WhisperClient;
use crate::{Error, Result};

/// The assembled gateway process
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until the cancellation token fires.
    ///
    /// Startup is fail-fast: missing required credentials or an unreachable
    /// backend abort before the server starts accepting work.
    ///
    /// # Errors
    ///
    /// Returns an error when required configuration is missing, the initial
    /// registry sync fails, or the ingestion server fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let cfg = &self.config;

        let stt: Arc<dyn SpeechToText> = match cfg.openai.api_key.as_deref() {
            Some(key) => {
                tracing::info!("using Whisper for speech-to-text");
                Arc::new(WhisperClient::new(key, &cfg.openai.language, cancel.clone())?)
            }
            None => {
                tracing::info!("no OpenAI API key configured, accepting text commands only");
                Arc::new(NoopSpeechToText)
            }
        };

        let anthropic_key = cfg.anthropic.api_key.as_deref().ok_or_else(|| {
            Error::Config("no LLM API key configured: set anthropic.api_key".to_string())
        })?;
        let intent = Arc::new(ClaudeParser::new(
            anthropic_key,
            cfg.anthropic.model.as_deref(),
            cancel.clone(),
        )?);

        let ha_url = cfg
            .home_assistant
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("home_assistant.url is required".to_string()))?;
        let ha_token = cfg
            .home_assistant
            .token
            .as_deref()
            .ok_or_else(|| Error::Config("home_assistant.token is required".to_string()))?;
        tracing::info!(url = %ha_url, "using Home Assistant for device control");
        let backend: Arc<dyn DeviceBackend> =
            Arc::new(HomeAssistantClient::new(ha_url, ha_token, cancel.clone()));

        let registry = Arc::new(Registry::new(backend.clone()));
        registry.sync().await?;
        let sync_handle =
            registry.start_periodic_sync(cfg.home_assistant.sync_interval, cancel.clone());

        let notifier: Arc<dyn Notifier> = if cfg.pushover.enabled {
            Arc::new(PushoverNotifier::new(
                cfg.pushover.token.as_deref().unwrap_or_default(),
                cfg.pushover.user_key.as_deref().unwrap_or_default(),
            ))
        } else {
            Arc::new(NoopNotifier)
        };

        let (queue, rx) = IngestQueue::new(cfg.server.queue_capacity);
        let state = Arc::new(ApiState::new(
            queue,
            RateLimiter::new(cfg.server.rate_limit, cfg.server.rate_window),
            cfg.server.webhook_secret.clone(),
        ));
        let server = ApiServer::new(state, cfg.server.addr.clone(), cfg.server.shutdown_grace);
        let mut server_handle = tokio::spawn(server.run(cancel.clone()));

        let pipeline = Pipeline::new(
            stt,
            intent,
            backend,
            registry,
            notifier,
            RetryPolicy::default(),
        );
        let pipeline_run = pipeline.run(rx, cancel.clone());
        tokio::pin!(pipeline_run);

        // A dying server must take the pipeline down with it, and vice versa.
        let server_result = tokio::select! {
            () = &mut pipeline_run => {
                cancel.cancel();
                (&mut server_handle).await
            }
            res = &mut server_handle => {
                cancel.cancel();
                pipeline_run.await;
                res
            }
        };

        if let Err(err) = sync_handle.await {
            tracing::error!(error = %err, "registry sync task panicked");
        }
        match server_result {
            Ok(result) => result?,
            Err(err) => tracing::error!(error = %err, "server task panicked"),
        }

        tracing::info!("gateway stopped");
        Ok(())
    }
}
