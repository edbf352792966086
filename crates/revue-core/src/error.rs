//! Error types for Revue.

use thiserror::Error;

/// Main error type for timeline and resolution operations.
#[derive(Error, Debug)]
pub enum RevueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The edit list has no sections at all.
    #[error("No frames")]
    NoFrames,

    /// A frame or skip request ran off either end of the edit list.
    #[error("No frames left")]
    NoFramesLeft,

    #[error("Media source not found: {0}")]
    SourceNotFound(String),

    #[error("Media source error: {0}")]
    Source(String),

    /// A source answered a batch request with the wrong number of frames.
    #[error(
        "media pointers returned by media source not matching requested number of frames \
         (expected {expected}, got {got})"
    )]
    BatchMismatch { expected: usize, got: usize },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Actor unavailable: {0}")]
    Disconnected(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RevueError {
    /// True for the recoverable "ran off the end" condition.
    pub fn is_no_frames_left(&self) -> bool {
        matches!(self, Self::NoFramesLeft)
    }
}

/// Result type alias for Revue operations.
pub type Result<T> = std::result::Result<T, RevueError>;
