//! Frame descriptors and the frame/time map.
//!
//! A `FrameDescriptor` is the fully resolved answer to "what must be
//! fetched for this play position". Descriptors are produced by a media
//! source, optionally stamped by the aggregation step, then frozen behind an
//! `Arc` and shared read-only with every downstream consumer.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::media::{ColourParams, MediaId, MediaType};
use crate::time::{FrameRate, RationalTime, Timecode};

/// Fully resolved pointer to one frame of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    /// Kind of stream this frame belongs to.
    pub media_type: MediaType,
    /// Owning source, nil for blank frames.
    pub source_id: MediaId,
    /// Location hint for the reader (path, URI...).
    pub uri: String,
    /// Stream index inside the container.
    pub stream_index: u32,
    /// Frame index local to the source.
    pub frame: i64,
    /// Native rate of the source.
    pub rate: FrameRate,
    /// Display timecode.
    pub timecode: Timecode,
    /// Content identity used for colour cache keys.
    pub content_id: String,
    /// Colour parameter set used for colour cache keys.
    pub colour_params: ColourParams,
    /// Position in the frame/time map that contains this descriptor.
    pub playhead_logical_frame: Option<i64>,
    /// Set when the owning source could not be resolved.
    pub error: Option<String>,
}

impl FrameDescriptor {
    /// A descriptor with no data behind it.
    pub fn blank(media_type: MediaType) -> Self {
        Self {
            media_type,
            source_id: MediaId::nil(),
            uri: String::new(),
            stream_index: 0,
            frame: 0,
            rate: FrameRate::default(),
            timecode: Timecode::default(),
            content_id: String::new(),
            colour_params: ColourParams::default(),
            playhead_logical_frame: None,
            error: None,
        }
    }

    /// A blank descriptor carrying the reason its source failed.
    pub fn blank_with_error(media_type: MediaType, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::blank(media_type)
        }
    }

    /// True when there is no source behind this frame.
    pub fn is_blank(&self) -> bool {
        self.source_id.is_nil()
    }

    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// Arc-wrapped descriptor for shared, read-only ownership.
pub type SharedFrameDescriptor = Arc<FrameDescriptor>;

/// Inclusive range of source-local frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub first: i64,
    pub last: i64,
}

impl FrameRange {
    pub fn new(first: i64, last: i64) -> Self {
        Self { first, last }
    }

    /// Range covering `count` frames from zero.
    pub fn leading(count: i64) -> Self {
        Self::new(0, count - 1)
    }

    pub fn len(self) -> usize {
        if self.last < self.first {
            0
        } else {
            (self.last - self.first + 1) as usize
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Frame ranges of one batch request; usually a single range.
pub type FrameRanges = SmallVec<[FrameRange; 2]>;

/// Ordered mapping from timeline time to the frame shown from that time.
///
/// An empty slot means "hold the previous frame until this time"; the
/// final entry of a fully built map is always empty and marks when the
/// last frame's display period expires.
#[derive(Debug, Clone, Default)]
pub struct FrameTimeMap {
    entries: BTreeMap<RationalTime, Option<SharedFrameDescriptor>>,
}

impl FrameTimeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, time: RationalTime, frame: Option<SharedFrameDescriptor>) {
        self.entries.insert(time, frame);
    }

    /// Number of entries, terminator included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, time: RationalTime) -> Option<&Option<SharedFrameDescriptor>> {
        self.entries.get(&time)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RationalTime, &Option<SharedFrameDescriptor>)> {
        self.entries.iter()
    }

    /// Frame on screen at `time`, if any.
    pub fn frame_at(&self, time: RationalTime) -> Option<&SharedFrameDescriptor> {
        self.entries
            .range(..=time)
            .next_back()
            .and_then(|(_, frame)| frame.as_ref())
    }

    /// Time at which the final frame stops being displayed.
    pub fn end_time(&self) -> Option<RationalTime> {
        self.entries.keys().next_back().copied()
    }

    /// Number of entries that carry a frame.
    pub fn frame_count(&self) -> usize {
        self.entries.values().filter(|f| f.is_some()).count()
    }

    /// Frames with their display times, in timeline order.
    pub fn frames_and_times(&self) -> Vec<(RationalTime, SharedFrameDescriptor)> {
        self.entries
            .iter()
            .filter_map(|(t, f)| f.as_ref().map(|f| (*t, Arc::clone(f))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_with_error() {
        let frame = FrameDescriptor::blank_with_error(MediaType::Image, "gone");
        assert!(frame.is_blank());
        assert!(frame.has_error());
        assert!(!FrameDescriptor::blank(MediaType::Audio).has_error());
    }

    #[test]
    fn test_frame_range_len() {
        assert_eq!(FrameRange::leading(10).len(), 10);
        assert!(FrameRange::leading(0).is_empty());
    }

    #[test]
    fn test_frame_at_holds_previous_frame() {
        let rate = FrameRate::FPS_24;
        let mut map = FrameTimeMap::new();
        let a = Arc::new(FrameDescriptor::blank(MediaType::Image));
        map.insert(RationalTime::ZERO, Some(Arc::clone(&a)));
        map.insert(RationalTime::from_frames(1, rate), None);

        assert!(map.frame_at(RationalTime::new(1, 48)).is_some());
        assert!(map.frame_at(RationalTime::from_frames(1, rate)).is_none());
        assert!(map.frame_at(RationalTime::new(-1, 1)).is_none());
        assert_eq!(map.end_time(), Some(RationalTime::from_frames(1, rate)));
        assert_eq!(map.frame_count(), 1);
        assert_eq!(map.len(), 2);
    }
}
