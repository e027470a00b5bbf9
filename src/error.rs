//! Error types for the Hearth gateway

use thiserror::Error;

/// Result type alias for Hearth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Hearth gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Intent parsing error
    #[error("intent error: {0}")]
    Intent(String),

    /// Device-control backend error
    #[error("backend error: {0}")]
    Backend(String),

    /// Notification delivery error
    #[error("notify error: {0}")]
    Notify(String),

    /// Device or scene name did not resolve against the registry
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation aborted by the shutdown signal
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error stems from cancellation of the run context.
    ///
    /// Cancellation terminates retry loops immediately instead of burning
    /// through the remaining attempts.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
