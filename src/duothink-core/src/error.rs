//! Error types for the coaching system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoachError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("No audio data returned")]
    MissingAudio,

    #[error("Failed to decode audio payload: {0}")]
    AudioDecode(#[from] base64::DecodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WAV output error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
