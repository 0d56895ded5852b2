use thiserror::Error;

/// Errors surfaced by the speech manager and its providers
#[derive(Error, Debug)]
pub enum SpeechError {
    /// Missing or placeholder credential, or unusable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure while talking to the synthesis service
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success response from the synthesis service
    #[error("Speech service returned {status}: {message}")]
    Service { status: u16, message: String },

    /// Audio device refused to start or the stream ended abnormally
    #[error("Playback error: {0}")]
    Playback(String),

    /// Rejected input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The service returned audio content that could not be decoded
    #[error("Failed to decode audio content: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SpeechError {
    /// Whether this error came from the remote synthesis path
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SpeechError::Network(_) | SpeechError::Service { .. } | SpeechError::Decode(_)
        )
    }
}

impl From<toml::de::Error> for SpeechError {
    fn from(err: toml::de::Error) -> Self {
        SpeechError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for SpeechError {
    fn from(err: serde_json::Error) -> Self {
        SpeechError::Serialization(err.to_string())
    }
}

/// Result type for speech operations
pub type SpeechResult<T> = Result<T, SpeechError>;

/// Errors raised by cache storage backends. These never reach callers of the manager.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store has no room for another entry
    #[error("Storage capacity exceeded")]
    Capacity,

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
