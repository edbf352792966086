//! Revue Core - Foundation types for timeline resolution
//!
//! This crate provides the fundamental types used throughout Revue:
//! - Time representation (RationalTime, FrameRate, Timecode, TimeSourceMode)
//! - Media identity and colour parameter sets
//! - Frame descriptors and the frame/time map built from an edit list
//! - Shared error type and configuration

pub mod config;
pub mod error;
pub mod frame;
pub mod media;
pub mod time;

pub use config::{ColourConfig, RevueConfig, TimelineConfig};
pub use error::{Result, RevueError};
pub use frame::{FrameDescriptor, FrameRange, FrameRanges, FrameTimeMap, SharedFrameDescriptor};
pub use media::{ColourParams, MediaId, MediaType};
pub use time::{FrameRate, RationalTime, TimeRange, TimeSourceMode, Timecode};

/// Default sizes shared by the timeline and colour crates.
pub mod defaults {
    /// Number of workers in each colour worker pool.
    pub const COLOUR_WORKERS: usize = 4;

    /// Name of the colour backend that is always available.
    pub const BUILTIN_BACKEND: &str = "builtin";

    /// Viewport identity used for thumbnail colour processing.
    pub const THUMBNAIL_VIEWPORT: &str = "viewport0";

    /// Capacity of actor mailboxes.
    pub const MAILBOX_CAPACITY: usize = 256;
}
