//! Colour subsystem errors.

use thiserror::Error;

/// Errors raised while computing or caching colour pipeline data.
///
/// Cloneable so one in-flight result can be delivered to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColourError {
    #[error("colour backend not found: {0}")]
    BackendNotFound(String),

    #[error("failed to instantiate colour backend {name}: {reason}")]
    Instantiation { name: String, reason: String },

    /// The builtin backend failed too; there is nothing left to fall back to.
    #[error("colour backend fallback exhausted: {0}")]
    FallbackExhausted(String),

    #[error("colour computation failed: {0}")]
    Compute(String),

    #[error("thumbnail processing failed: {0}")]
    Thumbnail(String),

    #[error("colour request timed out: {0}")]
    Timeout(String),

    #[error("colour worker pool closed: {0}")]
    PoolClosed(String),

    #[error("colour cache error: {0}")]
    Cache(String),
}

pub type ColourResult<T> = std::result::Result<T, ColourError>;
