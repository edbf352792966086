//! Runtime configuration.
//!
//! Loaded from JSON; every field has a default so partial documents are
//! accepted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::defaults;
use crate::error::{Result, RevueError};
use crate::time::FrameRate;

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevueConfig {
    pub timeline: TimelineConfig,
    pub colour: ColourConfig,
}

impl RevueConfig {
    /// Parse a configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if !self.timeline.default_rate.is_valid() {
            return Err(RevueError::Config(format!(
                "timeline.default_rate {}/{} is not a valid rate",
                self.timeline.default_rate.numerator, self.timeline.default_rate.denominator
            )));
        }
        if self.colour.worker_count == 0 || self.colour.thumbnail_worker_count == 0 {
            return Err(RevueError::Config(
                "colour worker pools need at least one worker".into(),
            ));
        }
        if self.colour.default_pipeline.is_empty() {
            return Err(RevueError::Config(
                "colour.default_pipeline must name a backend".into(),
            ));
        }
        Ok(())
    }
}

/// Edit list resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Deadline for point and batch resolution requests. `None` waits
    /// indefinitely.
    pub request_timeout_ms: Option<u64>,
    /// Playback rate used when no override rate is supplied.
    pub default_rate: FrameRate,
}

impl TimelineConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: Some(10_000),
            default_rate: FrameRate::FPS_24,
        }
    }
}

/// Colour pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColourConfig {
    /// Preferred colour backend name.
    pub default_pipeline: String,
    /// Size of the interactive worker pool.
    pub worker_count: usize,
    /// Size of the thumbnail worker pool.
    pub thumbnail_worker_count: usize,
    /// Deadline for colour data and instantiation requests. `None` waits
    /// indefinitely.
    pub request_timeout_ms: Option<u64>,
    /// Maximum number of cached entries.
    pub cache_max_count: usize,
    /// Maximum cached payload in megabytes.
    pub cache_max_size_mb: usize,
}

impl ColourConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn cache_max_size_bytes(&self) -> usize {
        self.cache_max_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ColourConfig {
    fn default() -> Self {
        Self {
            default_pipeline: defaults::BUILTIN_BACKEND.to_string(),
            worker_count: defaults::COLOUR_WORKERS,
            thumbnail_worker_count: defaults::COLOUR_WORKERS,
            request_timeout_ms: Some(10_000),
            cache_max_count: 4096,
            cache_max_size_mb: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config =
            RevueConfig::from_json_str(r#"{ "colour": { "default_pipeline": "ocio" } }"#).unwrap();
        assert_eq!(config.colour.default_pipeline, "ocio");
        assert_eq!(config.colour.worker_count, defaults::COLOUR_WORKERS);
        assert_eq!(config.timeline, TimelineConfig::default());
    }

    #[test]
    fn test_null_timeout_means_wait_forever() {
        let config =
            RevueConfig::from_json_str(r#"{ "timeline": { "request_timeout_ms": null } }"#)
                .unwrap();
        assert!(config.timeline.request_timeout().is_none());
    }

    #[test]
    fn test_rejects_empty_pool() {
        let err = RevueConfig::from_json_str(r#"{ "colour": { "worker_count": 0 } }"#);
        assert!(matches!(err, Err(RevueError::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = RevueConfig::from_json_str("{ not json");
        assert!(matches!(err, Err(RevueError::Serialization(_))));
    }
}
