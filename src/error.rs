use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShadowError {
    #[error("Caption parsing failed: {0}")]
    CaptionParse(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Playback source error: {0}")]
    Source(#[from] SourceError),

    #[error("Scheduler is no longer running")]
    SchedulerClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShadowError>;

/// Errors reported by a playback backend.
///
/// Cloneable so that one cached load failure can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("failed to load media or player: {0}")]
    Load(String),

    #[error("player is not ready")]
    NotReady,

    #[error("player error {code}: {message}")]
    Player { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl SourceError {
    /// Whether the backend can no longer be driven.
    ///
    /// Load failures and 4xx player codes (bad identifier, rejected
    /// credentials) are terminal. Everything else is retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        match self {
            SourceError::Load(_) => true,
            SourceError::Player { code, .. } => (400..500).contains(code),
            SourceError::NotReady | SourceError::Transport(_) => false,
        }
    }
}
