//! Push notifications via Pushover
//!
//! Notification is best-effort: the pipeline logs failures and moves on, so
//! this client keeps no retry state. With missing credentials it degrades to
//! a silent no-op, which lets deployments run without Pushover configured.

use async_trait::async_trait;

use crate::pipeline::Notifier;
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.pushover.net";
const TITLE: &str = "Smart Home";

/// Pushover message client
pub struct PushoverNotifier {
    client: reqwest::Client,
    token: String,
    user_key: String,
    base_url: String,
}

impl PushoverNotifier {
    #[must_use]
    pub fn new(token: &str, user_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
            user_key: user_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        if self.token.is_empty() || self.user_key.is_empty() {
            return Ok(());
        }

        let params = [
            ("token", self.token.as_str()),
            ("user", self.user_key.as_str()),
            ("message", message),
            ("title", TITLE),
        ];

        let response = self
            .client
            .post(format!("{}/1/messages.json", self.base_url))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Notify(format!("pushover error: {status}")));
        }

        tracing::debug!("notification delivered");
        Ok(())
    }
}
