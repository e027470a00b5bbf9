//! Speech-to-text via the OpenAI Whisper API

use reqwest::multipart;
use tokio_util::sync::CancellationToken;

use crate::pipeline::SpeechToText;
use crate::retry::{RetryPolicy, is_retryable_status, with_retry};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MODEL: &str = "whisper-1";

/// Whisper transcription client
#[derive(Debug)]
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    language: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl WhisperClient {
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the API key is empty.
    pub fn new(api_key: &str, language: &str, cancel: CancellationToken) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("OpenAI API key is required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            language: language.to_string(),
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

    async fn request(&self, audio: &[u8]) -> Result<String> {
        let file = multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(format!("building transcription request: {e}")))?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("model", MODEL)
            .text("language", self.language.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
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
            return Err(Error::Stt(format!(
                "transcription API returned {status}{retryable}: {body}"
            )));
        }

        let transcription: TranscriptionResponse = response.json().await?;
        Ok(transcription.text)
    }
}

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait::async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let text = with_retry(&self.cancel, &self.retry, || self.request(audio)).await?;
        Ok(text.trim().to_string())
    }
}
