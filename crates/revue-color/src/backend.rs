//! Colour backend collaborator.

use revue_core::{ColourParams, FrameDescriptor};
use std::sync::Arc;

use crate::data::{ColourPipelineData, ThumbnailBuffer};
use crate::error::ColourResult;

/// Computes colour pipeline data for frames.
///
/// `setup` is the expensive, cacheable part and runs on worker threads.
/// `update_uniforms` is cheap and runs for every frame, cached or not.
pub trait ColourBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Stable cache key for a content id and parameter set.
    fn compute_hash(&self, content_id: &str, params: &ColourParams) -> String;

    fn make_empty_data(&self) -> ColourPipelineData;

    /// Fill `data` with the operations for this content and parameter set.
    fn setup(
        &self,
        data: &mut ColourPipelineData,
        content_id: &str,
        params: &ColourParams,
    ) -> ColourResult<()>;

    /// Set the per-frame uniform values on a copy of the shared data.
    fn update_uniforms(
        &self,
        data: &mut ColourPipelineData,
        frame: &FrameDescriptor,
    ) -> ColourResult<()>;

    /// Convert a thumbnail from source encoding to display.
    fn process_thumbnail(
        &self,
        frame: &FrameDescriptor,
        buffer: ThumbnailBuffer,
    ) -> ColourResult<ThumbnailBuffer>;
}

pub type SharedBackend = Arc<dyn ColourBackend>;
