//! In-memory media source.
//!
//! Produces descriptors for a clip of known length without touching any
//! media. Used by the headless driver and by tests, where the knobs for
//! failing or truncating batches exercise the aggregation error paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use revue_core::{
    ColourParams, FrameDescriptor, FrameRanges, FrameRate, MediaId, MediaType, RationalTime,
    Result, RevueError, Timecode,
};
use std::sync::Arc;

use crate::edit_list::{EditList, EditListSection};
use crate::source::MediaSource;

/// Request counters shared with whoever built the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntheticStats {
    pub edit_list_requests: usize,
    pub point_requests: usize,
    pub batch_requests: usize,
}

/// A clip that exists only in memory.
#[derive(Debug)]
pub struct SyntheticSource {
    id: MediaId,
    name: String,
    start: i64,
    frames: i64,
    rate: FrameRate,
    media_types: Vec<MediaType>,
    content_id: String,
    colour_params: ColourParams,
    failure: Option<String>,
    short_batches: bool,
    stats: Arc<Mutex<SyntheticStats>>,
}

impl SyntheticSource {
    pub fn builder(name: impl Into<String>) -> SyntheticSourceBuilder {
        SyntheticSourceBuilder::new(name)
    }

    pub fn id(&self) -> MediaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counter handle; stays valid after the source is moved into a resolver.
    pub fn stats(&self) -> Arc<Mutex<SyntheticStats>> {
        Arc::clone(&self.stats)
    }

    fn check_failure(&self) -> Result<()> {
        match &self.failure {
            Some(reason) => Err(RevueError::Source(reason.clone())),
            None => Ok(()),
        }
    }

    fn check_stream(&self, media_type: MediaType) -> Result<()> {
        if !self.has_stream(media_type) {
            return Err(RevueError::Source(format!(
                "{} has no {} stream",
                self.name, media_type
            )));
        }
        Ok(())
    }

    fn has_stream(&self, media_type: MediaType) -> bool {
        self.media_types.contains(&media_type)
    }

    fn descriptor(&self, media_type: MediaType, frame: i64) -> FrameDescriptor {
        FrameDescriptor {
            media_type,
            source_id: self.id,
            uri: format!("memory://{}", self.name),
            stream_index: 0,
            frame,
            rate: self.rate,
            timecode: Timecode::new(frame, self.rate),
            content_id: self.content_id.clone(),
            colour_params: self.colour_params.clone(),
            playhead_logical_frame: None,
            error: None,
        }
    }
}

#[async_trait]
impl MediaSource for SyntheticSource {
    async fn identity(&self) -> Result<MediaId> {
        Ok(self.id)
    }

    async fn edit_list(&self, media_type: MediaType) -> Result<EditList> {
        self.stats.lock().edit_list_requests += 1;
        self.check_stream(media_type)?;
        Ok(EditList::from_sections([EditListSection::new(
            self.id,
            self.start,
            self.frames,
            self.rate,
        )]))
    }

    async fn media_pointer(&self, media_type: MediaType, frame: i64) -> Result<FrameDescriptor> {
        self.stats.lock().point_requests += 1;
        self.check_failure()?;
        if frame < self.start || frame >= self.start + self.frames {
            return Err(RevueError::NoFramesLeft);
        }
        if !self.has_stream(media_type) {
            return Ok(FrameDescriptor::blank(media_type));
        }
        Ok(self.descriptor(media_type, frame))
    }

    async fn media_pointers(
        &self,
        media_type: MediaType,
        ranges: FrameRanges,
        rate: FrameRate,
    ) -> Result<Vec<FrameDescriptor>> {
        self.stats.lock().batch_requests += 1;
        self.check_failure()?;
        let has_stream = self.has_stream(media_type);

        let mut frames = Vec::with_capacity(ranges.iter().map(|r| r.len()).sum());
        for range in &ranges {
            for n in range.first..=range.last {
                // a missing stream plays as silence or black
                if !has_stream {
                    frames.push(FrameDescriptor::blank(media_type));
                    continue;
                }
                let offset = if rate == self.rate {
                    n
                } else {
                    RationalTime::from_frames(n, rate).to_frames(self.rate)
                };
                frames.push(self.descriptor(media_type, self.start + offset));
            }
        }
        if self.short_batches {
            frames.pop();
        }
        Ok(frames)
    }
}

/// Builder for [`SyntheticSource`].
#[derive(Debug)]
pub struct SyntheticSourceBuilder {
    source: SyntheticSource,
}

impl SyntheticSourceBuilder {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: SyntheticSource {
                id: MediaId::new(),
                content_id: name.clone(),
                name,
                start: 0,
                frames: 24,
                rate: FrameRate::FPS_24,
                media_types: vec![MediaType::Image],
                colour_params: ColourParams::new(),
                failure: None,
                short_batches: false,
                stats: Arc::default(),
            },
        }
    }

    pub fn id(mut self, id: MediaId) -> Self {
        self.source.id = id;
        self
    }

    pub fn frames(mut self, frames: i64) -> Self {
        self.source.frames = frames;
        self
    }

    /// First source frame of the clip.
    pub fn start(mut self, start: i64) -> Self {
        self.source.start = start;
        self
    }

    pub fn rate(mut self, rate: FrameRate) -> Self {
        self.source.rate = rate;
        self
    }

    pub fn media_types(mut self, media_types: impl IntoIterator<Item = MediaType>) -> Self {
        self.source.media_types = media_types.into_iter().collect();
        self
    }

    pub fn content_id(mut self, content_id: impl Into<String>) -> Self {
        self.source.content_id = content_id.into();
        self
    }

    pub fn colour_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.source.colour_params.insert(key, value);
        self
    }

    /// Every frame query fails with `reason`. The edit list still resolves.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.source.failure = Some(reason.into());
        self
    }

    /// Batches come back one frame short.
    pub fn short_batches(mut self) -> Self {
        self.source.short_batches = true;
        self
    }

    pub fn build(self) -> SyntheticSource {
        self.source
    }
}
