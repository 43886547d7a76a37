//! Error types for intelbridge

use thiserror::Error;

/// Result type alias for intelbridge operations
pub type Result<T> = std::result::Result<T, IntelError>;

/// Application-level code the destination uses for a missing record.
pub const NOT_FOUND_CODE: u16 = 404;

/// Main error type for intelbridge
#[derive(Error, Debug)]
pub enum IntelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Error payload returned by the destination API in an otherwise valid response
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Indicator type with no destination mapping
    #[error("Unmappable indicator type: {0}")]
    Unmappable(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl IntelError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an API error from a code and message
    pub fn api(code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Whether this error describes a record that does not exist.
    ///
    /// Both the typed variant and an API payload carrying the 404 code count.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api { code, .. } => *code == NOT_FOUND_CODE,
            _ => false,
        }
    }

    /// Whether another attempt at the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Io(_) => true,
            Self::Api { code, .. } => *code != NOT_FOUND_CODE,
            _ => false,
        }
    }
}
