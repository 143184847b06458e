use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Invalid transcript: {0}")]
    InvalidTranscript(String),

    #[error("Seek to {target:.3}s not confirmed within {}ms", waited.as_millis())]
    SeekTimeout { target: f64, waited: Duration },

    #[error("Audio source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid playback rate: {0}")]
    InvalidRate(f64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Vocabulary error: {0}")]
    Vocabulary(String),

    #[error("Player session is closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PlayerError {
    /// Errors that only cost a single tick or a single seek.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlayerError::SeekTimeout { .. } | PlayerError::SourceUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
