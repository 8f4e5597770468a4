//! Error types for the inventory watcher
//!
//! Two layers live here:
//! - [`Error`]: crate-wide failures (persistence, delivery, configuration)
//! - [`FetchError`]: the outcome kinds of a single exhibition API call,
//!   returned as values so callers decide the isolation policy

use thiserror::Error;

/// Result type alias for watcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the watcher
#[derive(Error, Debug)]
pub enum Error {
    /// Known-state persistence errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Per-destination notification delivery errors
    #[error("Delivery error (channel {channel_id}): {message}")]
    Delivery {
        /// Destination channel
        channel_id: u64,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel transport not ready yet
    #[error("Transport not ready: {0}")]
    NotReady(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a delivery error for a destination channel
    pub fn delivery(channel_id: u64, message: impl Into<String>) -> Self {
        Self::Delivery {
            channel_id,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not ready" error
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Failure kinds of one exhibition API call
///
/// None of these are fatal to the polling loop. The next scheduled cycle is
/// the retry mechanism.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network-level failure or timeout
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-200 HTTP status
    #[error("HTTP {status}")]
    Http {
        /// HTTP status code
        status: u16,
    },

    /// Response body was not valid JSON
    #[error("JSON parse failed: {0}")]
    Parse(String),

    /// Vendor reported a failure in the application status block
    #[error("{message} ({code})")]
    Application {
        /// Vendor response code
        code: String,
        /// Vendor response message
        message: String,
    },

    /// Success code with an empty data payload
    ///
    /// Must never be merged as "zero vehicles".
    #[error("spoofed success (empty data payload)")]
    EvasionDetected,
}

impl FetchError {
    /// Short machine-friendly name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Http { .. } => "http",
            FetchError::Parse(_) => "parse",
            FetchError::Application { .. } => "application",
            FetchError::EvasionDetected => "evasion_detected",
        }
    }
}
