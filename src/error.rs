//! Error types for the viva voice client

use thiserror::Error;

/// Result type alias for viva operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice assessment client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone access was refused or no input device exists
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),

    /// Recording stopped without any buffered audio
    #[error("no audio captured")]
    NoAudioCaptured,

    /// Transcription service failure (network or non-2xx)
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Speech synthesis service failure (network or non-2xx)
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Audio output refused playback
    #[error("playback blocked: {0}")]
    PlaybackBlocked(String),

    /// Question set error
    #[error("question set error: {0}")]
    QuestionSet(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
